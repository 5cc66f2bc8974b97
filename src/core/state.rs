//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Execution is in progress
    Running,
    /// Every step completed
    Completed,
    /// A step failed and the run was halted
    Failed,
    /// The run was cancelled by a caller
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

/// Status of a step result or an agent result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultStatus::Completed | ResultStatus::Failed)
    }
}

/// Outcome of one agent invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_type: String,
    pub status: ResultStatus,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set iff `status` is failed
    #[serde(default)]
    pub error: Option<String>,
}

impl AgentResult {
    /// Create a result for an agent that has just started
    pub fn running(agent_type: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            status: ResultStatus::Running,
            session_id,
            started_at: Some(Utc::now()),
            completed_at: None,
            error: None,
        }
    }

    /// Returns false if the result was already terminal
    pub fn complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ResultStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Returns false if the result was already terminal
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ResultStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        true
    }
}

/// Result of one step, created when the step begins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: usize,
    pub status: ResultStatus,
    pub agents: Vec<AgentResult>,
}

impl StepResult {
    pub fn new(step: usize) -> Self {
        Self {
            step,
            status: ResultStatus::Running,
            agents: Vec::new(),
        }
    }

    /// Record an agent start and return its index
    pub fn begin_agent(&mut self, agent_type: impl Into<String>, session_id: Option<String>) -> usize {
        self.agents.push(AgentResult::running(agent_type, session_id));
        self.agents.len() - 1
    }

    pub fn agent_mut(&mut self, index: usize) -> Option<&mut AgentResult> {
        self.agents.get_mut(index)
    }

    /// Fail every agent that has not reached a terminal state yet
    ///
    /// Returns the number of agents that were marked.
    pub fn fail_in_flight(&mut self, error: &str) -> usize {
        self.agents
            .iter_mut()
            .filter(|a| !a.status.is_terminal())
            .map(|a| a.fail(error))
            .filter(|marked| *marked)
            .count()
    }

    /// Derive the step status from its agents
    pub fn resolve(&mut self) -> ResultStatus {
        self.status = if self.agents.iter().any(|a| a.status == ResultStatus::Failed) {
            ResultStatus::Failed
        } else if !self.agents.is_empty()
            && self.agents.iter().all(|a| a.status == ResultStatus::Completed)
        {
            ResultStatus::Completed
        } else if self.agents.is_empty() {
            ResultStatus::Pending
        } else {
            ResultStatus::Running
        };
        self.status
    }
}

/// One run of a pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub pipeline_id: String,
    pub status: ExecutionStatus,
    /// Number of the step in flight, or the last one attempted
    pub current_step: usize,
    pub total_steps: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<StepResult>,
}

impl Execution {
    pub fn new(pipeline_id: impl Into<String>, total_steps: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id: pipeline_id.into(),
            status: ExecutionStatus::Running,
            current_step: 0,
            total_steps,
            started_at: Utc::now(),
            completed_at: None,
            results: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append a running result for `step` and make it current
    ///
    /// Returns the index of the new result, or `None` once the execution is
    /// terminal or every step already has a result.
    pub fn begin_step(&mut self, step: usize) -> Option<usize> {
        if self.is_terminal() || self.results.len() >= self.total_steps {
            return None;
        }
        self.results.push(StepResult::new(step));
        self.current_step = step;
        Some(self.results.len() - 1)
    }

    pub fn step_result(&self, step: usize) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step == step)
    }

    pub fn step_result_mut(&mut self, step: usize) -> Option<&mut StepResult> {
        if self.is_terminal() {
            return None;
        }
        self.results.iter_mut().find(|r| r.step == step)
    }

    /// Mark the execution completed
    pub fn complete(&mut self) {
        self.finish(ExecutionStatus::Completed);
    }

    /// Mark the execution failed
    pub fn fail(&mut self) {
        self.finish(ExecutionStatus::Failed);
    }

    /// Mark the execution cancelled
    pub fn cancel(&mut self) {
        self.finish(ExecutionStatus::Cancelled);
    }

    fn finish(&mut self, status: ExecutionStatus) {
        if self.is_terminal() {
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    pub fn completed_steps(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ResultStatus::Completed)
            .count()
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps() as f64 / self.total_steps as f64
    }
}
