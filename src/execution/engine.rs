//! Main execution engine - starts, tracks and cancels pipeline runs

use crate::{
    agent::{AgentInvoker, SimulatedInvoker},
    core::{config::EngineConfig, DefinitionError, Execution, ExecutionStatus, PipelineDefinition},
    execution::{
        events::{channel, ExecutionEvent, ProgressEmitter},
        executor::{StepExecutor, StepOutcome, CANCELLED_ERROR},
        recorder::ExecutionRecorder,
    },
    persistence::{update_with_retry, ExecutionStore},
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Errors surfaced to callers of the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid pipeline definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error("execution {0} not found")]
    NotFound(Uuid),

    #[error("execution store error: {0}")]
    Store(String),
}

impl EngineError {
    fn store(err: anyhow::Error) -> Self {
        EngineError::Store(format!("{:#}", err))
    }
}

/// Per-run options
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Directory agents run in
    pub working_dir: PathBuf,
    /// Replace real agents with the simulated invoker
    pub simulate: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            simulate: false,
        }
    }
}

impl StartOptions {
    pub fn simulated() -> Self {
        Self {
            simulate: true,
            ..Self::default()
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// This request cancelled the execution
    Cancelled,
    /// The execution had already reached this status
    AlreadyTerminal(ExecutionStatus),
}

impl CancelOutcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            CancelOutcome::Cancelled => ExecutionStatus::Cancelled,
            CancelOutcome::AlreadyTerminal(status) => *status,
        }
    }
}

/// Live driver of one execution
#[derive(Clone)]
struct RunHandle {
    cancel: CancellationToken,
    done: watch::Receiver<Option<Execution>>,
}

impl RunHandle {
    /// Wait for the driver's final execution; `None` if the driver vanished
    async fn finished(mut self) -> Option<Execution> {
        let finished = match self.done.wait_for(|e| e.is_some()).await {
            Ok(execution) => execution.clone(),
            Err(_) => None,
        };
        finished
    }
}

/// Drives pipeline executions on the tokio runtime
pub struct ExecutionEngine<A> {
    agent: Arc<A>,
    store: Arc<dyn ExecutionStore>,
    emitter: Arc<dyn ProgressEmitter>,
    config: EngineConfig,
    runs: Arc<Mutex<HashMap<Uuid, RunHandle>>>,
}

impl<A> Clone for ExecutionEngine<A> {
    fn clone(&self) -> Self {
        Self {
            agent: self.agent.clone(),
            store: self.store.clone(),
            emitter: self.emitter.clone(),
            config: self.config.clone(),
            runs: self.runs.clone(),
        }
    }
}

impl<A: AgentInvoker + 'static> ExecutionEngine<A> {
    pub fn new(
        agent: A,
        store: Arc<dyn ExecutionStore>,
        emitter: Arc<dyn ProgressEmitter>,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            store,
            emitter,
            config: EngineConfig::default(),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate and persist a new execution, then run it in the background
    ///
    /// Returns as soon as the execution record exists; progress is observed
    /// through the store or the emitter.
    pub async fn start(
        &self,
        definition: PipelineDefinition,
        options: StartOptions,
    ) -> Result<Uuid, EngineError> {
        definition.validate()?;

        let execution = Execution::new(&definition.id, definition.steps.len());
        let id = execution.id;

        // registered before the record is visible: a cancel must never see an orphan
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        self.runs.lock().await.insert(
            id,
            RunHandle {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );
        if let Err(e) = self.store.create(&execution).await {
            self.runs.lock().await.remove(&id);
            return Err(EngineError::store(e));
        }

        info!(
            "Starting pipeline execution: {} ({}){}",
            definition.display_name(),
            id,
            if options.simulate { " [simulated]" } else { "" }
        );
        self.emitter.publish(
            &channel(id),
            &ExecutionEvent::ExecutionStarted {
                execution_id: id,
                pipeline_id: definition.id.clone(),
                total_steps: definition.steps.len(),
            },
        );

        let invoker: Arc<dyn AgentInvoker> = if options.simulate {
            Arc::new(SimulatedInvoker::new(self.config.simulate_delay()))
        } else {
            self.agent.clone()
        };
        let executor = StepExecutor::new(invoker, self.config.clone());
        let recorder = ExecutionRecorder::new(
            execution,
            self.store.clone(),
            self.emitter.clone(),
            self.config.retry_policy(),
        );

        let runs = self.runs.clone();
        tokio::spawn(
            async move {
                let execution = drive(executor, recorder, definition, options.working_dir, cancel).await;
                info!(
                    "Execution finished: {} ({} of {} steps completed)",
                    execution.status.as_str(),
                    execution.completed_steps(),
                    execution.total_steps
                );
                let _ = done_tx.send(Some(execution));
                runs.lock().await.remove(&id);
            }
            .instrument(info_span!("execution", %id)),
        );

        Ok(id)
    }

    /// Request cancellation and wait for the run to settle
    ///
    /// Cancelling a terminal execution reports its status instead of failing.
    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, EngineError> {
        let live = {
            let runs = self.runs.lock().await;
            runs.get(&id).cloned().map(|handle| {
                let first_request = !handle.cancel.is_cancelled();
                handle.cancel.cancel();
                (handle, first_request)
            })
        };
        if let Some((handle, first_request)) = live {
            if let Some(execution) = handle.finished().await {
                return Ok(match execution.status {
                    ExecutionStatus::Cancelled if first_request => CancelOutcome::Cancelled,
                    status => CancelOutcome::AlreadyTerminal(status),
                });
            }
            warn!("Driver of execution {} stopped without a result", id);
            self.runs.lock().await.remove(&id);
        }

        let mut execution = self
            .store
            .get(id)
            .await
            .map_err(EngineError::store)?
            .ok_or(EngineError::NotFound(id))?;
        if execution.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(execution.status));
        }

        warn!("Execution {} has no live driver, marking it cancelled", id);
        let step = execution.current_step;
        if let Some(result) = execution.step_result_mut(step) {
            result.fail_in_flight(CANCELLED_ERROR);
            result.resolve();
        }
        execution.cancel();
        update_with_retry(self.store.as_ref(), &execution, self.config.retry_policy()).await;
        self.emitter.publish(
            &channel(id),
            &ExecutionEvent::ExecutionCancelled {
                execution_id: id,
                step,
            },
        );
        Ok(CancelOutcome::Cancelled)
    }

    /// Current stored state of an execution
    pub async fn get_execution(&self, id: Uuid) -> Result<Execution, EngineError> {
        self.store
            .get(id)
            .await
            .map_err(EngineError::store)?
            .ok_or(EngineError::NotFound(id))
    }

    /// Wait until an execution is terminal and return its final state
    ///
    /// Executions without a live driver are returned as stored.
    pub async fn wait(&self, id: Uuid) -> Result<Execution, EngineError> {
        let handle = self.runs.lock().await.get(&id).cloned();
        if let Some(handle) = handle {
            if let Some(execution) = handle.finished().await {
                return Ok(execution);
            }
        }
        self.get_execution(id).await
    }

    /// Whether this engine is currently driving `id`
    pub async fn is_running(&self, id: Uuid) -> bool {
        self.runs.lock().await.contains_key(&id)
    }

    /// Recent executions, newest first
    pub async fn list_executions(
        &self,
        pipeline_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Execution>, EngineError> {
        self.store
            .list(pipeline_id, limit)
            .await
            .map_err(EngineError::store)
    }
}

/// Advance one execution step by step until it is terminal
async fn drive(
    executor: StepExecutor,
    mut recorder: ExecutionRecorder,
    definition: PipelineDefinition,
    working_dir: PathBuf,
    cancel: CancellationToken,
) -> Execution {
    for step in &definition.steps {
        if cancel.is_cancelled() {
            recorder.finish_cancelled().await;
            return recorder.into_execution();
        }

        match executor
            .run_step(&mut recorder, step, &working_dir, &cancel)
            .await
        {
            StepOutcome::Completed => {}
            StepOutcome::Failed => {
                recorder.finish_failed().await;
                return recorder.into_execution();
            }
            StepOutcome::Cancelled => {
                recorder.finish_cancelled().await;
                return recorder.into_execution();
            }
        }
    }

    recorder.finish_completed().await;
    recorder.into_execution()
}
