//! Step executor - fans a step's agents out and joins them

use crate::{
    agent::{AgentChunk, AgentError, AgentInvoker, AgentOutput, ChannelCallback, InvocationContext},
    core::{
        config::{EngineConfig, FailurePolicy},
        ResultStatus, Step,
    },
    execution::recorder::ExecutionRecorder,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Error recorded on agents interrupted by an execution cancel
pub const CANCELLED_ERROR: &str = "cancelled: execution cancelled";

/// Error recorded on agents whose task ended without a result
pub const ABORTED_ERROR: &str = "agent task aborted";

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Every agent completed
    Completed,
    /// At least one agent failed
    Failed,
    /// The execution was cancelled while the step was in flight
    Cancelled,
}

type AgentTaskResult = (usize, Result<AgentOutput, AgentError>);

/// Runs one step at a time for a single execution
pub struct StepExecutor {
    invoker: Arc<dyn AgentInvoker>,
    config: EngineConfig,
}

impl StepExecutor {
    pub fn new(invoker: Arc<dyn AgentInvoker>, config: EngineConfig) -> Self {
        Self { invoker, config }
    }

    /// Run every agent of `step` concurrently and wait for all of them
    ///
    /// Once `cancel` fires, in-flight agents are marked failed right away and
    /// their tasks get `cancel_grace` to wind down before being aborted.
    pub async fn run_step(
        &self,
        recorder: &mut ExecutionRecorder,
        step: &Step,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        if !recorder.begin_step(step).await {
            return StepOutcome::Failed;
        }

        let step_token = cancel.child_token();
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<(usize, AgentChunk)>();
        let mut join_set: JoinSet<AgentTaskResult> = JoinSet::new();
        let agent_timeout = self.config.agent_timeout();

        for spec in &step.agents {
            let session_id = Uuid::new_v4().to_string();
            let Some(index) = recorder
                .begin_agent(step.number, &spec.agent_type, &session_id)
                .await
            else {
                break;
            };

            let context = InvocationContext {
                execution_id: recorder.id(),
                pipeline_id: recorder.execution().pipeline_id.clone(),
                step: step.number,
                session_id,
                working_dir: working_dir.to_path_buf(),
            };
            let invoker = self.invoker.clone();
            let spec = spec.clone();
            let token = step_token.clone();
            let progress = ChannelCallback::new(index, chunk_tx.clone());

            join_set.spawn(async move {
                let result =
                    match timeout(agent_timeout, invoker.invoke(&spec, &context, token, &progress))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(AgentError::Timeout(agent_timeout.as_secs())),
                    };
                (index, result)
            });
        }
        // the channel closes once every agent task is gone
        drop(chunk_tx);

        let grace = tokio::time::sleep(self.config.cancel_grace());
        tokio::pin!(grace);
        let mut cancelling = false;
        let mut chunks_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancelling => {
                    cancelling = true;
                    info!("Cancelling step {}", step.number);
                    step_token.cancel();
                    recorder.fail_in_flight(step.number, CANCELLED_ERROR).await;
                    grace.as_mut().reset(Instant::now() + self.config.cancel_grace());
                }

                _ = &mut grace, if cancelling => {
                    warn!(
                        "{} agent(s) of step {} ignored cancellation, aborting",
                        join_set.len(),
                        step.number
                    );
                    join_set.shutdown().await;
                    break;
                }

                chunk = chunk_rx.recv(), if chunks_open => match chunk {
                    Some((index, chunk)) if !cancelling => {
                        recorder.emit_chunk(step.number, index, chunk);
                    }
                    Some(_) => {}
                    None => chunks_open = false,
                },

                joined = join_set.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    // chunks sent before the agent returned go out before its result
                    while let Ok((index, chunk)) = chunk_rx.try_recv() {
                        if !cancelling {
                            recorder.emit_chunk(step.number, index, chunk);
                        }
                    }
                    match joined {
                        Ok((index, Ok(output))) => {
                            recorder
                                .complete_agent(step.number, index, output.session_id)
                                .await;
                        }
                        Ok((index, Err(e))) => {
                            let failed = recorder
                                .fail_agent(step.number, index, &e.to_string())
                                .await;
                            if failed
                                && self.config.failure_policy == FailurePolicy::CancelSiblings
                                && !step_token.is_cancelled()
                            {
                                debug!("Cancelling siblings in step {}", step.number);
                                step_token.cancel();
                            }
                        }
                        Err(e) => error!("Agent task in step {} did not finish: {}", step.number, e),
                    }
                }
            }
        }

        recorder.fail_in_flight(step.number, ABORTED_ERROR).await;
        let status = recorder.resolve_step(step.number).await;

        if cancelling {
            StepOutcome::Cancelled
        } else if status == ResultStatus::Completed {
            StepOutcome::Completed
        } else {
            StepOutcome::Failed
        }
    }
}
