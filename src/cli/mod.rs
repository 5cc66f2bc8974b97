//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, LevelsCommand, RunCommand, ShowCommand, ValidateCommand};
use std::ffi::OsString;

/// Run multi-agent pipelines step by step
#[derive(Debug, Parser, Clone)]
#[command(name = "agent-pipeline")]
#[command(version)]
#[command(about = "Execution engine for multi-agent pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline file
    Validate(ValidateCommand),

    /// Show how a pipeline's steps group into levels
    Levels(LevelsCommand),

    /// Show execution history
    History(HistoryCommand),

    /// Show one execution with its step and agent results
    Show(ShowCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
