//! Streaming support for agent invocations
//!
//! Invokers report incremental output through a [`ProgressCallback`] while
//! they run. The engine hands each invocation a [`ChannelCallback`] that
//! forwards chunks, in order, to the driver of the execution.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// A fragment of agent output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentChunk {
    /// Phase tag (e.g. "design", "implementation")
    pub phase: String,

    /// Text fragment
    pub text: String,
}

impl AgentChunk {
    pub fn new(phase: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            text: text.into(),
        }
    }
}

/// Callback for chunks produced during an invocation
///
/// This trait is object-safe and can be used as `&dyn ProgressCallback`.
pub trait ProgressCallback: Send + Sync {
    /// Called for each chunk, in the order the agent produced them
    fn on_chunk(&self, chunk: AgentChunk);
}

/// Callback that drops every chunk
#[derive(Debug, Clone, Default)]
pub struct NoopCallback;

impl ProgressCallback for NoopCallback {
    fn on_chunk(&self, _chunk: AgentChunk) {}
}

/// Forwards chunks to a channel, tagged with the agent's index in its step
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    index: usize,
    tx: UnboundedSender<(usize, AgentChunk)>,
}

impl ChannelCallback {
    pub fn new(index: usize, tx: UnboundedSender<(usize, AgentChunk)>) -> Self {
        Self { index, tx }
    }
}

impl ProgressCallback for ChannelCallback {
    fn on_chunk(&self, chunk: AgentChunk) {
        // receiver gone means the step is already resolved
        let _ = self.tx.send((self.index, chunk));
    }
}
