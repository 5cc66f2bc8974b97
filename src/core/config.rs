//! Pipeline and engine configuration from YAML

use crate::core::{AgentSpec, ModelTier, PipelineDefinition, Step};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline identifier
    pub id: String,

    /// Pipeline name (optional)
    #[serde(default)]
    pub name: Option<String>,

    /// Model tier for agents that do not set one
    #[serde(default)]
    pub default_model: Option<ModelTier>,

    /// Pipeline steps
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step number; defaults to the position in the list
    #[serde(default)]
    pub step: Option<usize>,

    /// Whether this step is grouped with adjacent parallel steps
    #[serde(default)]
    pub parallel: bool,

    /// Agents to invoke
    pub agents: Vec<AgentConfig>,
}

/// Agent configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent type
    #[serde(rename = "type")]
    pub agent_type: String,

    /// Model tier (overrides `default_model`)
    #[serde(default)]
    pub model: Option<ModelTier>,

    /// Work description
    pub prompt: String,

    /// Linked task id
    #[serde(default)]
    pub task_id: Option<String>,

    /// Phase tag for streamed output
    #[serde(default)]
    pub phase: Option<String>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration through the definition it produces
    pub fn validate(&self) -> Result<()> {
        self.to_definition().validate()?;
        Ok(())
    }

    /// Convert config to a pipeline definition
    pub fn to_definition(&self) -> PipelineDefinition {
        let default_model = self.default_model.unwrap_or_default();

        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(position, step)| Step {
                number: step.step.unwrap_or(position + 1),
                parallel: step.parallel,
                agents: step
                    .agents
                    .iter()
                    .map(|agent| AgentSpec {
                        agent_type: agent.agent_type.clone(),
                        model: agent.model.unwrap_or(default_model),
                        prompt: agent.prompt.clone(),
                        task_id: agent.task_id.clone(),
                        phase: agent.phase.clone(),
                    })
                    .collect(),
            })
            .collect();

        PipelineDefinition {
            id: self.id.clone(),
            name: self.name.clone(),
            steps,
        }
    }
}

/// What happens to sibling agents when one agent of a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Siblings run to their own terminal state before the step fails
    #[default]
    LetSiblingsFinish,
    /// Siblings are cancelled as soon as one agent fails
    CancelSiblings,
}

/// Persistence retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub backoff: Duration,
}

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Partial failure handling inside a step
    pub failure_policy: FailurePolicy,

    /// Timeout for a single agent invocation
    pub agent_timeout_secs: u64,

    /// Duration of a simulated agent
    pub simulate_delay_ms: u64,

    /// Time given to in-flight agents to stop after cancellation
    pub cancel_grace_ms: u64,

    /// Attempts per persistence write
    pub persist_attempts: usize,

    /// Backoff between persistence attempts (multiplied by the attempt number)
    pub persist_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            agent_timeout_secs: 10800,
            simulate_delay_ms: 50,
            cancel_grace_ms: 2000,
            persist_attempts: 3,
            persist_backoff_ms: 100,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load engine configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        if config.persist_attempts == 0 {
            anyhow::bail!("persist_attempts must be at least 1");
        }
        Ok(config)
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_agent_timeout(mut self, timeout_secs: u64) -> Self {
        self.agent_timeout_secs = timeout_secs;
        self
    }

    pub fn with_simulate_delay(mut self, delay_ms: u64) -> Self {
        self.simulate_delay_ms = delay_ms;
        self
    }

    pub fn with_cancel_grace(mut self, grace_ms: u64) -> Self {
        self.cancel_grace_ms = grace_ms;
        self
    }

    pub fn with_persist_retry(mut self, attempts: usize, backoff_ms: u64) -> Self {
        self.persist_attempts = attempts.max(1);
        self.persist_backoff_ms = backoff_ms;
        self
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn simulate_delay(&self) -> Duration {
        Duration::from_millis(self.simulate_delay_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.persist_attempts.max(1),
            backoff: Duration::from_millis(self.persist_backoff_ms),
        }
    }
}
