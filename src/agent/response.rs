//! Agent outcome types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for agent invocations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Successful outcome of an agent invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Full text produced by the agent
    pub content: String,

    /// Session id reported by the agent, replacing the one assigned at start
    pub session_id: Option<String>,
}

impl AgentOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}
