//! Persistence layer for execution records

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

use crate::core::config::RetryPolicy;
use crate::core::Execution;
use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{error, warn};
use uuid::Uuid;

/// Trait for execution record storage
///
/// Records are upserted by id; readers may poll a record while its driver
/// keeps writing it.
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Store a new execution
    async fn create(&self, execution: &Execution) -> Result<()>;

    /// Replace the stored record of an execution
    async fn update(&self, execution: &Execution) -> Result<()>;

    /// Load an execution by ID
    async fn get(&self, id: Uuid) -> Result<Option<Execution>>;

    /// List executions, newest first, optionally for one pipeline
    async fn list(&self, pipeline_id: Option<&str>, limit: usize) -> Result<Vec<Execution>>;
}

/// In-memory store (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, Execution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(&self, execution: &Execution) -> Result<()> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&execution.id) {
            anyhow::bail!("Execution {} already exists", execution.id);
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &Execution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Execution>> {
        Ok(self.executions.read().await.get(&id).cloned())
    }

    async fn list(&self, pipeline_id: Option<&str>, limit: usize) -> Result<Vec<Execution>> {
        let executions = self.executions.read().await;
        let mut result: Vec<Execution> = executions
            .values()
            .filter(|e| pipeline_id.map_or(true, |id| e.pipeline_id == id))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }
}

/// Write an execution, retrying failed attempts
///
/// Returns false when every attempt failed. The failure is logged; callers
/// keep running since the next transition writes the full record again.
pub async fn update_with_retry(
    store: &dyn ExecutionStore,
    execution: &Execution,
    policy: RetryPolicy,
) -> bool {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match store.update(execution).await {
            Ok(()) => return true,
            Err(e) if attempt < attempts => {
                warn!(
                    "Persisting execution {} failed (attempt {}/{}): {:#}",
                    execution.id, attempt, attempts, e
                );
                tokio::time::sleep(policy.backoff * attempt as u32).await;
            }
            Err(e) => {
                error!(
                    "Giving up persisting execution {} after {} attempts: {:#}",
                    execution.id, attempts, e
                );
            }
        }
    }
    false
}
