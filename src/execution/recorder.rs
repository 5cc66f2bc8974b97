//! Driver-owned record of one execution
//!
//! Every transition goes through here so that the in-memory execution, the
//! stored copy and the published events never disagree. Once the execution
//! is terminal all mutating calls are ignored.

use crate::agent::AgentChunk;
use crate::core::config::RetryPolicy;
use crate::core::{Execution, ResultStatus, Step};
use crate::execution::events::{channel, ExecutionEvent, ProgressChunk, ProgressEmitter};
use crate::persistence::{update_with_retry, ExecutionStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ExecutionRecorder {
    execution: Execution,
    store: Arc<dyn ExecutionStore>,
    emitter: Arc<dyn ProgressEmitter>,
    retry: RetryPolicy,
    channel: String,
}

impl ExecutionRecorder {
    pub fn new(
        execution: Execution,
        store: Arc<dyn ExecutionStore>,
        emitter: Arc<dyn ProgressEmitter>,
        retry: RetryPolicy,
    ) -> Self {
        let channel = channel(execution.id);
        Self {
            execution,
            store,
            emitter,
            retry,
            channel,
        }
    }

    pub fn id(&self) -> Uuid {
        self.execution.id
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn into_execution(self) -> Execution {
        self.execution
    }

    /// Write the current state, retrying per policy
    pub async fn persist(&self) -> bool {
        update_with_retry(self.store.as_ref(), &self.execution, self.retry).await
    }

    pub fn emit(&self, event: ExecutionEvent) {
        self.emitter.publish(&self.channel, &event);
    }

    /// Create the running result for `step`
    ///
    /// Returns false if the execution can no longer accept a step.
    pub async fn begin_step(&mut self, step: &Step) -> bool {
        if self.execution.begin_step(step.number).is_none() {
            warn!(
                "Execution {} refused step {} (status: {})",
                self.execution.id,
                step.number,
                self.execution.status.as_str()
            );
            return false;
        }
        info!(
            "Step {}/{} started with {} agent(s)",
            step.number,
            self.execution.total_steps,
            step.agents.len()
        );
        self.persist().await;
        self.emit(ExecutionEvent::StepStarted {
            execution_id: self.execution.id,
            step: step.number,
            agents: step.agents.len(),
        });
        true
    }

    /// Record an agent as running and return its index within the step
    pub async fn begin_agent(
        &mut self,
        step: usize,
        agent_type: &str,
        session_id: &str,
    ) -> Option<usize> {
        let index = self
            .execution
            .step_result_mut(step)?
            .begin_agent(agent_type, Some(session_id.to_string()));
        debug!("Agent {} started in step {} ({})", agent_type, step, session_id);
        self.persist().await;
        self.emit(ExecutionEvent::AgentStarted {
            execution_id: self.execution.id,
            step,
            agent: index,
            agent_type: agent_type.to_string(),
            session_id: session_id.to_string(),
        });
        Some(index)
    }

    fn agent_type(&self, step: usize, index: usize) -> Option<String> {
        self.execution
            .step_result(step)
            .and_then(|r| r.agents.get(index))
            .map(|a| a.agent_type.clone())
    }

    /// Forward one chunk of agent output; nothing is persisted
    pub fn emit_chunk(&self, step: usize, index: usize, chunk: AgentChunk) {
        if self.execution.is_terminal() {
            return;
        }
        let Some(agent_type) = self.agent_type(step, index) else {
            return;
        };
        self.emit(ExecutionEvent::StreamChunk(ProgressChunk {
            execution_id: self.execution.id,
            step,
            agent: index,
            agent_type,
            phase: chunk.phase,
            text: chunk.text,
            timestamp: Utc::now(),
        }));
    }

    /// Mark an agent completed; a reported session id replaces the assigned one
    ///
    /// Returns false if the agent was already terminal.
    pub async fn complete_agent(
        &mut self,
        step: usize,
        index: usize,
        session_id: Option<String>,
    ) -> bool {
        let Some(agent) = self
            .execution
            .step_result_mut(step)
            .and_then(|r| r.agent_mut(index))
        else {
            return false;
        };
        if !agent.complete() {
            debug!("Ignoring late completion of {} in step {}", agent.agent_type, step);
            return false;
        }
        if session_id.is_some() {
            agent.session_id = session_id;
        }
        let agent_type = agent.agent_type.clone();

        info!("Agent {} completed (step {})", agent_type, step);
        self.persist().await;
        self.emit(ExecutionEvent::AgentCompleted {
            execution_id: self.execution.id,
            step,
            agent: index,
            agent_type,
        });
        true
    }

    /// Mark an agent failed
    ///
    /// Returns false if the agent was already terminal.
    pub async fn fail_agent(&mut self, step: usize, index: usize, error: &str) -> bool {
        let Some(agent) = self
            .execution
            .step_result_mut(step)
            .and_then(|r| r.agent_mut(index))
        else {
            return false;
        };
        if !agent.fail(error) {
            debug!("Ignoring late failure of {} in step {}", agent.agent_type, step);
            return false;
        }
        let agent_type = agent.agent_type.clone();

        warn!("Agent {} failed (step {}): {}", agent_type, step, error);
        self.persist().await;
        self.emit(ExecutionEvent::AgentFailed {
            execution_id: self.execution.id,
            step,
            agent: index,
            agent_type,
            error: error.to_string(),
        });
        true
    }

    /// Fail every agent of `step` that is not terminal yet
    ///
    /// Returns the number of agents marked.
    pub async fn fail_in_flight(&mut self, step: usize, error: &str) -> usize {
        let Some(result) = self.execution.step_result_mut(step) else {
            return 0;
        };
        let marked: Vec<(usize, String)> = result
            .agents
            .iter_mut()
            .enumerate()
            .filter_map(|(index, a)| a.fail(error).then(|| (index, a.agent_type.clone())))
            .collect();
        if marked.is_empty() {
            return 0;
        }

        self.persist().await;
        for (index, agent_type) in &marked {
            self.emit(ExecutionEvent::AgentFailed {
                execution_id: self.execution.id,
                step,
                agent: *index,
                agent_type: agent_type.clone(),
                error: error.to_string(),
            });
        }
        marked.len()
    }

    /// Derive the step status from its agents and publish it
    pub async fn resolve_step(&mut self, step: usize) -> ResultStatus {
        let Some(result) = self.execution.step_result_mut(step) else {
            return self
                .execution
                .step_result(step)
                .map(|r| r.status)
                .unwrap_or(ResultStatus::Pending);
        };
        let status = result.resolve();
        self.persist().await;

        let execution_id = self.execution.id;
        match status {
            ResultStatus::Completed => {
                info!("Step {} completed", step);
                self.emit(ExecutionEvent::StepCompleted { execution_id, step });
            }
            ResultStatus::Failed => {
                warn!("Step {} failed", step);
                self.emit(ExecutionEvent::StepFailed { execution_id, step });
            }
            other => debug!("Step {} resolved as {:?}", step, other),
        }
        status
    }

    pub async fn finish_completed(&mut self) {
        if self.execution.is_terminal() {
            return;
        }
        self.execution.complete();
        info!("Execution {} completed", self.execution.id);
        self.persist().await;
        self.emit(ExecutionEvent::ExecutionCompleted {
            execution_id: self.execution.id,
        });
    }

    pub async fn finish_failed(&mut self) {
        if self.execution.is_terminal() {
            return;
        }
        self.execution.fail();
        warn!(
            "Execution {} failed at step {}",
            self.execution.id, self.execution.current_step
        );
        self.persist().await;
        self.emit(ExecutionEvent::ExecutionFailed {
            execution_id: self.execution.id,
            step: self.execution.current_step,
        });
    }

    pub async fn finish_cancelled(&mut self) {
        if self.execution.is_terminal() {
            return;
        }
        self.execution.cancel();
        info!(
            "Execution {} cancelled at step {}",
            self.execution.id, self.execution.current_step
        );
        self.persist().await;
        self.emit(ExecutionEvent::ExecutionCancelled {
            execution_id: self.execution.id,
            step: self.execution.current_step,
        });
    }
}
