//! Simulated agent used by dry runs
//!
//! Produces a fixed pair of chunks and succeeds after a fixed delay, so a
//! run exercises the full state machine without doing real work.

use crate::agent::{AgentChunk, AgentError, AgentInvoker, AgentOutput, InvocationContext, ProgressCallback};
use crate::core::AgentSpec;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Deterministic stand-in for a real agent
#[derive(Debug, Clone)]
pub struct SimulatedInvoker {
    delay: Duration,
}

impl SimulatedInvoker {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedInvoker {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

#[async_trait]
impl AgentInvoker for SimulatedInvoker {
    async fn invoke(
        &self,
        spec: &AgentSpec,
        context: &InvocationContext,
        cancel: CancellationToken,
        progress: &dyn ProgressCallback,
    ) -> Result<AgentOutput, AgentError> {
        debug!(
            "Simulating {} for step {} ({:?})",
            spec.agent_type, context.step, self.delay
        );
        let half = self.delay / 2;

        progress.on_chunk(AgentChunk::new(
            "design",
            format!("[simulated] {} planning: {}\n", spec.agent_type, spec.prompt),
        ));

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AgentError::Cancelled("simulation interrupted".to_string()));
            }
            _ = tokio::time::sleep(half) => {}
        }

        progress.on_chunk(AgentChunk::new(
            spec.phase_or_default(),
            format!("[simulated] {} working on step {}\n", spec.agent_type, context.step),
        ));

        tokio::select! {
            _ = cancel.cancelled() => {
                Err(AgentError::Cancelled("simulation interrupted".to_string()))
            }
            _ = tokio::time::sleep(self.delay - half) => {
                Ok(AgentOutput::new(format!("[simulated] {} done", spec.agent_type)))
            }
        }
    }
}
