//! CLI output formatting

use crate::{
    core::{Execution, ExecutionStatus, Level, ResultStatus},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use uuid::Uuid;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static STOP: Emoji<'_, '_> = Emoji("🛑 ", "x ");

/// Create a step progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps {msg}",
    ) {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// First eight characters of an id
pub fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a step or agent status for display
pub fn format_result_status(status: ResultStatus) -> String {
    match status {
        ResultStatus::Pending => style("PENDING").dim().to_string(),
        ResultStatus::Running => style("RUNNING").yellow().to_string(),
        ResultStatus::Completed => style("COMPLETED").green().to_string(),
        ResultStatus::Failed => style("FAILED").red().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Cancelled => STOP,
    }
}

/// One-line summary of an execution
pub fn format_execution_summary(execution: &Execution) -> String {
    format!(
        "{} {} - {} - {} ({}/{}) - {}",
        status_icon(execution.status),
        style(short_id(execution.id)).dim(),
        style(&execution.pipeline_id).bold(),
        format_status(execution.status),
        execution.completed_steps(),
        execution.total_steps,
        style(execution.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// Format a lifecycle event; stream chunks are printed elsewhere
pub fn format_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::ExecutionStarted {
            execution_id,
            pipeline_id,
            total_steps,
        } => format!(
            "{} Starting pipeline {} ({}, {} steps)",
            ROCKET,
            style(pipeline_id).bold(),
            style(short_id(*execution_id)).dim(),
            total_steps
        ),
        ExecutionEvent::StepStarted { step, agents, .. } => format!(
            "{} Step {} ({} agent{})",
            SPINNER,
            style(step).cyan(),
            agents,
            if *agents == 1 { "" } else { "s" }
        ),
        ExecutionEvent::AgentStarted {
            step, agent_type, ..
        } => format!(
            "  {} {} started (step {})",
            SPINNER,
            style(agent_type).cyan(),
            step
        ),
        ExecutionEvent::StreamChunk(_) => return None,
        ExecutionEvent::AgentCompleted { agent_type, .. } => {
            format!("  {} {}", CHECK, style(agent_type).green())
        }
        ExecutionEvent::AgentFailed {
            agent_type, error, ..
        } => format!(
            "  {} {}: {}",
            CROSS,
            style(agent_type).red(),
            style(error).dim()
        ),
        ExecutionEvent::StepCompleted { step, .. } => {
            format!("{} Step {} completed", CHECK, style(step).green())
        }
        ExecutionEvent::StepFailed { step, .. } => {
            format!("{} Step {} failed", CROSS, style(step).red())
        }
        ExecutionEvent::ExecutionCompleted { execution_id } => format!(
            "{} Pipeline ({}) completed {}",
            INFO,
            style(short_id(*execution_id)).dim(),
            style("successfully").green()
        ),
        ExecutionEvent::ExecutionFailed { execution_id, step } => format!(
            "{} Pipeline ({}) {} at step {}",
            INFO,
            style(short_id(*execution_id)).dim(),
            style("failed").red(),
            step
        ),
        ExecutionEvent::ExecutionCancelled { execution_id, step } => format!(
            "{} Pipeline ({}) {} at step {}",
            INFO,
            style(short_id(*execution_id)).dim(),
            style("cancelled").yellow(),
            step
        ),
    };
    Some(line)
}

/// Format one level of the level plan
pub fn format_level(index: usize, level: &Level<'_>) -> String {
    let steps = level
        .step_numbers()
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "  Level {}: step{} {} ({} agent{})",
        style(index + 1).cyan(),
        if level.len() == 1 { "" } else { "s" },
        style(steps).bold(),
        level.agent_count(),
        if level.agent_count() == 1 { "" } else { "s" }
    )
}

/// Format a duration as `1h 2m 3s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
