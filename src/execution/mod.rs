//! Pipeline execution engine

pub mod engine;
pub mod events;
pub mod executor;
pub mod recorder;

pub use engine::{CancelOutcome, EngineError, ExecutionEngine, StartOptions};
pub use events::{
    BroadcastEmitter, CallbackEmitter, ExecutionEvent, NoopEmitter, ProgressChunk,
    ProgressEmitter, Published,
};
pub use executor::{StepExecutor, StepOutcome};
pub use recorder::ExecutionRecorder;
