//! CLI command definitions

use crate::cli::terminal_output::DEFAULT_BUFFER_CAPACITY;
use clap::Args;
use std::path::PathBuf;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Run simulated agents instead of the agent CLI
    #[arg(long)]
    pub simulate: bool,

    /// Directory agents run in (defaults to the current directory)
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,

    /// History database path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Engine configuration YAML file
    #[arg(long)]
    pub engine_config: Option<PathBuf>,

    /// Print agent output as it streams in
    #[arg(short, long)]
    pub stream: bool,

    /// Bytes of one agent's partial output held back before printing
    #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub buffer: usize,

    /// Agent CLI executable
    #[arg(long, default_value = "claude")]
    pub agent: String,

    /// Override the agent argument template (repeatable)
    #[arg(long = "agent-arg", allow_hyphen_values = true)]
    pub agent_args: Vec<String>,
}

/// Validate a pipeline file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the level grouping of a pipeline
#[derive(Debug, Args, Clone)]
pub struct LevelsCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline id to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// History database path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show one execution
#[derive(Debug, Args, Clone)]
pub struct ShowCommand {
    /// Execution ID
    pub execution_id: String,

    /// History database path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
