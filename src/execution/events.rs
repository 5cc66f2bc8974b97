//! Lifecycle and progress notifications
//!
//! Every execution publishes on its own channel (`execution:<uuid>`).
//! Delivery is fire-and-forget; the execution store stays the source of
//! truth for anyone who missed an event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// One fragment of incremental agent output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressChunk {
    pub execution_id: Uuid,
    pub step: usize,
    /// Position of the agent within its step
    pub agent: usize,
    pub agent_type: String,
    pub phase: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Events that can occur during an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: Uuid,
        pipeline_id: String,
        total_steps: usize,
    },
    StepStarted {
        execution_id: Uuid,
        step: usize,
        agents: usize,
    },
    AgentStarted {
        execution_id: Uuid,
        step: usize,
        agent: usize,
        agent_type: String,
        session_id: String,
    },
    StreamChunk(ProgressChunk),
    AgentCompleted {
        execution_id: Uuid,
        step: usize,
        agent: usize,
        agent_type: String,
    },
    AgentFailed {
        execution_id: Uuid,
        step: usize,
        agent: usize,
        agent_type: String,
        error: String,
    },
    StepCompleted {
        execution_id: Uuid,
        step: usize,
    },
    StepFailed {
        execution_id: Uuid,
        step: usize,
    },
    ExecutionCompleted {
        execution_id: Uuid,
    },
    ExecutionFailed {
        execution_id: Uuid,
        step: usize,
    },
    ExecutionCancelled {
        execution_id: Uuid,
        step: usize,
    },
}

impl ExecutionEvent {
    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => "execution_started",
            ExecutionEvent::StepStarted { .. } => "step_started",
            ExecutionEvent::AgentStarted { .. } => "agent_started",
            ExecutionEvent::StreamChunk(_) => "stream_chunk",
            ExecutionEvent::AgentCompleted { .. } => "agent_completed",
            ExecutionEvent::AgentFailed { .. } => "agent_failed",
            ExecutionEvent::StepCompleted { .. } => "step_completed",
            ExecutionEvent::StepFailed { .. } => "step_failed",
            ExecutionEvent::ExecutionCompleted { .. } => "execution_completed",
            ExecutionEvent::ExecutionFailed { .. } => "execution_failed",
            ExecutionEvent::ExecutionCancelled { .. } => "execution_cancelled",
        }
    }

    pub fn execution_id(&self) -> Uuid {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::StepStarted { execution_id, .. }
            | ExecutionEvent::AgentStarted { execution_id, .. }
            | ExecutionEvent::AgentCompleted { execution_id, .. }
            | ExecutionEvent::AgentFailed { execution_id, .. }
            | ExecutionEvent::StepCompleted { execution_id, .. }
            | ExecutionEvent::StepFailed { execution_id, .. }
            | ExecutionEvent::ExecutionCompleted { execution_id }
            | ExecutionEvent::ExecutionFailed { execution_id, .. }
            | ExecutionEvent::ExecutionCancelled { execution_id, .. } => *execution_id,
            ExecutionEvent::StreamChunk(chunk) => chunk.execution_id,
        }
    }

    /// Whether this event ends the execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::ExecutionCompleted { .. }
                | ExecutionEvent::ExecutionFailed { .. }
                | ExecutionEvent::ExecutionCancelled { .. }
        )
    }
}

/// Channel name for one execution
pub fn channel(execution_id: Uuid) -> String {
    format!("execution:{}", execution_id)
}

/// Fire-and-forget sink for execution events
pub trait ProgressEmitter: Send + Sync {
    fn publish(&self, channel: &str, event: &ExecutionEvent);
}

/// Emitter that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

impl ProgressEmitter for NoopEmitter {
    fn publish(&self, _channel: &str, _event: &ExecutionEvent) {}
}

/// A published event together with its channel
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub channel: String,
    pub event: ExecutionEvent,
}

/// Emitter backed by a tokio broadcast channel
///
/// Slow subscribers lag and lose events rather than blocking the driver.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    sender: broadcast::Sender<Published>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ProgressEmitter for BroadcastEmitter {
    fn publish(&self, channel: &str, event: &ExecutionEvent) {
        // no subscribers is fine
        let _ = self.sender.send(Published {
            channel: channel.to_string(),
            event: event.clone(),
        });
    }
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&str, &ExecutionEvent) + Send + Sync>;

/// Emitter that calls registered handlers in registration order
#[derive(Default, Clone)]
pub struct CallbackEmitter {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl CallbackEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn add_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &ExecutionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(Arc::new(handler));
        }
    }
}

impl ProgressEmitter for CallbackEmitter {
    fn publish(&self, channel: &str, event: &ExecutionEvent) {
        trace!("{} <- {}", channel, event.kind());
        let handlers = match self.handlers.lock() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers.iter() {
            handler(channel, event);
        }
    }
}
