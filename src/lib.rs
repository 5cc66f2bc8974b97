//! agent-pipeline - execution engine for multi-agent pipelines

pub mod agent;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use agent::{
    AgentChunk, AgentClientConfig, AgentError, AgentInvoker, AgentOutput, InvocationContext,
    ProgressCallback, SimulatedInvoker, SubprocessInvoker,
};
pub use core::config::{EngineConfig, FailurePolicy, PipelineConfig};
pub use core::{
    plan_levels, AgentResult, AgentSpec, DefinitionError, Execution, ExecutionStatus, Level,
    ModelTier, PipelineDefinition, ResultStatus, Step, StepResult,
};
pub use execution::{
    BroadcastEmitter, CallbackEmitter, CancelOutcome, EngineError, ExecutionEngine,
    ExecutionEvent, NoopEmitter, ProgressChunk, ProgressEmitter, StartOptions,
};
pub use persistence::{ExecutionStore, InMemoryExecutionStore};
#[cfg(feature = "sqlite")]
pub use persistence::SqliteExecutionStore;
