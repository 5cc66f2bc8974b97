//! Pipeline definition domain model

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model tier an agent runs on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Haiku,
    #[default]
    Sonnet,
    Opus,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Haiku => "haiku",
            ModelTier::Sonnet => "sonnet",
            ModelTier::Opus => "opus",
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent invocation inside a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Agent type (e.g. "architect", "backend")
    pub agent_type: String,

    /// Model tier used for the invocation
    #[serde(default)]
    pub model: ModelTier,

    /// Work description handed to the agent
    pub prompt: String,

    /// Task this agent works on, if any
    #[serde(default)]
    pub task_id: Option<String>,

    /// Phase tag attached to streamed output (e.g. "design")
    #[serde(default)]
    pub phase: Option<String>,
}

impl AgentSpec {
    pub fn new(agent_type: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            model: ModelTier::default(),
            prompt: prompt.into(),
            task_id: None,
            phase: None,
        }
    }

    pub fn with_model(mut self, model: ModelTier) -> Self {
        self.model = model;
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Phase tag for output produced by this agent
    pub fn phase_or_default(&self) -> &str {
        self.phase.as_deref().unwrap_or(DEFAULT_PHASE)
    }
}

/// Phase used when an agent spec does not name one
pub const DEFAULT_PHASE: &str = "implementation";

/// A single step in a pipeline
///
/// `parallel` only affects how adjacent steps are grouped for display
/// (see [`crate::core::levels`]); every agent of a step is always started
/// concurrently by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position of the step
    pub number: usize,

    /// Whether the step belongs to a parallel group
    #[serde(default)]
    pub parallel: bool,

    /// Agents invoked by this step
    pub agents: Vec<AgentSpec>,
}

impl Step {
    pub fn new(number: usize, parallel: bool, agents: Vec<AgentSpec>) -> Self {
        Self {
            number,
            parallel,
            agents,
        }
    }
}

/// An immutable pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Steps in execution order
    pub steps: Vec<Step>,
}

/// Reasons a definition is rejected before an execution is created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("pipeline '{0}' has no steps")]
    NoSteps(String),

    #[error("step {0} has no agents")]
    NoAgents(usize),

    #[error("step numbers must be dense and start at 1: expected {expected}, found {found}")]
    StepNumber { expected: usize, found: usize },

    #[error("step {step} agent #{index} has an empty agent type")]
    EmptyAgentType { step: usize, index: usize },

    #[error("pipeline id must not be empty")]
    EmptyId,
}

impl PipelineDefinition {
    pub fn new(id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: None,
            steps,
        }
    }

    /// Name for display, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn total_agents(&self) -> usize {
        self.steps.iter().map(|s| s.agents.len()).sum()
    }

    /// Check the structural invariants the engine relies on
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.id.trim().is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        if self.steps.is_empty() {
            return Err(DefinitionError::NoSteps(self.id.clone()));
        }

        for (position, step) in self.steps.iter().enumerate() {
            let expected = position + 1;
            if step.number != expected {
                return Err(DefinitionError::StepNumber {
                    expected,
                    found: step.number,
                });
            }
            if step.agents.is_empty() {
                return Err(DefinitionError::NoAgents(step.number));
            }
            for (index, agent) in step.agents.iter().enumerate() {
                if agent.agent_type.trim().is_empty() {
                    return Err(DefinitionError::EmptyAgentType {
                        step: step.number,
                        index,
                    });
                }
            }
        }

        Ok(())
    }
}
