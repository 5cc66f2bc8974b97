//! Agent client configuration

use crate::core::AgentSpec;

/// Configuration for the subprocess agent client
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// Agent CLI executable (defaults to "claude", assumed on PATH)
    pub program: String,

    /// Argument template; `{model}`, `{prompt}` and `{agent}` are substituted
    pub args: Vec<String>,

    /// Timeout for one invocation in seconds
    pub timeout_secs: u64,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec![
                "--print".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
                "{prompt}".to_string(),
            ],
            timeout_secs: 10800,
        }
    }
}

impl AgentClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Expand the argument template for one agent
    pub fn render_args(&self, spec: &AgentSpec) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model}", spec.model.as_str())
                    .replace("{agent}", &spec.agent_type)
                    .replace("{prompt}", &spec.prompt)
            })
            .collect()
    }
}
