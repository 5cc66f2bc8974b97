//! Agent invocation boundary

pub mod client;
pub mod response;
pub mod simulated;
pub mod streaming;
pub mod subprocess_client;

use crate::core::AgentSpec;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use client::AgentClientConfig;
pub use response::{AgentError, AgentOutput};
pub use simulated::SimulatedInvoker;
pub use streaming::{AgentChunk, ChannelCallback, NoopCallback, ProgressCallback};
pub use subprocess_client::SubprocessInvoker;

/// Where and on whose behalf an agent runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub execution_id: Uuid,
    pub pipeline_id: String,
    pub step: usize,
    /// Session id the engine assigned when the agent started
    pub session_id: String,
    pub working_dir: PathBuf,
}

/// Starts one agent unit of work and waits for its terminal outcome
///
/// Implementations report incremental output through `progress` and are
/// expected to return promptly with [`AgentError::Cancelled`] once
/// `cancel` fires.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        spec: &AgentSpec,
        context: &InvocationContext,
        cancel: CancellationToken,
        progress: &dyn ProgressCallback,
    ) -> Result<AgentOutput, AgentError>;
}
