use agent_pipeline::cli::commands::{
    HistoryCommand, LevelsCommand, RunCommand, ShowCommand, ValidateCommand,
};
use agent_pipeline::cli::output::*;
use agent_pipeline::cli::terminal_output::TerminalPrinter;
use agent_pipeline::cli::{Cli, Command};
use agent_pipeline::core::config::{EngineConfig, PipelineConfig};
use agent_pipeline::core::{plan_levels, Execution, ExecutionStatus};
use agent_pipeline::execution::{ExecutionEngine, StartOptions};
use agent_pipeline::persistence::{ExecutionStore, InMemoryExecutionStore};
use agent_pipeline::agent::{AgentClientConfig, SubprocessInvoker};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Levels(cmd) => show_levels(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
        Command::Show(cmd) => show_execution(cmd).await?,
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store(db: Option<&Path>) -> Result<Arc<dyn ExecutionStore>> {
    use agent_pipeline::persistence::SqliteExecutionStore;

    let store = match db {
        Some(path) => SqliteExecutionStore::open(path).await?,
        None => SqliteExecutionStore::with_default_path().await?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(_db: Option<&Path>) -> Result<Arc<dyn ExecutionStore>> {
    anyhow::bail!("Execution history requires the `sqlite` feature")
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let definition = config.to_definition();

    println!(
        "{} Loaded pipeline: {} ({} steps, {} agents)",
        INFO,
        style(definition.display_name()).bold(),
        definition.steps.len(),
        definition.total_agents()
    );

    let engine_config = match &cmd.engine_config {
        Some(path) => EngineConfig::from_file(path).context("Failed to load engine config")?,
        None => EngineConfig::default(),
    };
    debug!("Engine config: {:?}", engine_config);

    let store: Arc<dyn ExecutionStore> = if cmd.no_history {
        Arc::new(InMemoryExecutionStore::new())
    } else {
        open_store(cmd.db.as_deref()).await?
    };

    let mut agent_config = AgentClientConfig::new()
        .with_program(&cmd.agent)
        .with_timeout(engine_config.agent_timeout_secs);
    if !cmd.agent_args.is_empty() {
        agent_config = agent_config.with_args(cmd.agent_args.iter().cloned());
    }
    let agent = SubprocessInvoker::new(agent_config);

    let printer = Arc::new(
        TerminalPrinter::new(cmd.stream, definition.steps.len()).with_buffer_capacity(cmd.buffer),
    );
    let engine = ExecutionEngine::new(agent, store, printer.clone()).with_config(engine_config);

    let working_dir = match &cmd.workdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to resolve working directory")?,
    };
    let options = StartOptions {
        working_dir,
        simulate: cmd.simulate,
    };

    println!();
    let id = engine.start(definition, options).await?;

    let execution = tokio::select! {
        result = engine.wait(id) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n{} Cancelling execution {}...", WARN, style(short_id(id)).dim());
            let outcome = engine.cancel(id).await?;
            debug!("Cancel outcome: {:?}", outcome);
            engine.wait(id).await?
        }
    };
    printer.finish();

    if !cmd.no_history {
        println!(
            "\n{} Execution saved to history (ID: {})",
            INFO,
            style(short_id(id)).dim()
        );
    }

    let name = config.name.as_deref().unwrap_or(&config.id);
    match execution.status {
        ExecutionStatus::Completed => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        status => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(name).bold(),
                format_status(status)
            );
            for failure in failed_agents(&execution) {
                error!("{}", failure);
            }
            std::process::exit(1);
        }
    }
}

fn failed_agents(execution: &Execution) -> Vec<String> {
    execution
        .results
        .iter()
        .flat_map(|step| {
            step.agents.iter().filter_map(move |agent| {
                agent
                    .error
                    .as_ref()
                    .map(|e| format!("step {} {}: {}", step.step, agent.agent_type, e))
            })
        })
        .collect()
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            let definition = config.to_definition();
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Id: {}", style(&definition.id).bold());
            println!("  Name: {}", style(definition.display_name()).bold());
            println!("  Steps: {}", style(definition.steps.len()).cyan());
            println!("  Agents: {}", style(definition.total_agents()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&definition)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn show_levels(cmd: &LevelsCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let definition = config.to_definition();
    let levels = plan_levels(&definition.steps);

    if cmd.json {
        let data = serde_json::json!({
            "pipeline": definition.id,
            "levels": levels,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "{} {} groups into {} level(s):",
        INFO,
        style(definition.display_name()).bold(),
        levels.len()
    );
    for (index, level) in levels.iter().enumerate() {
        println!("{}", format_level(index, level));
    }
    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store(cmd.db.as_deref()).await?;
    let executions = store.list(cmd.pipeline.as_deref(), cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
    for execution in &executions {
        println!("  {}", format_execution_summary(execution));
    }

    Ok(())
}

async fn show_execution(cmd: &ShowCommand) -> Result<()> {
    let id = Uuid::parse_str(&cmd.execution_id).context("Invalid execution ID format")?;
    let store = open_store(cmd.db.as_deref()).await?;

    let Some(execution) = store.get(id).await? else {
        println!("{} Execution not found", WARN);
        std::process::exit(1);
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
        return Ok(());
    }

    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(execution.id).cyan());
    println!("  Pipeline: {}", style(&execution.pipeline_id).bold());
    println!("  Status: {}", format_status(execution.status));
    println!(
        "  Progress: {} ({}/{} steps, current step {})",
        style(format!("{:.0}%", execution.progress() * 100.0)).cyan(),
        execution.completed_steps(),
        execution.total_steps,
        execution.current_step
    );
    println!("  Started: {}", style(execution.started_at.to_rfc3339()).dim());
    if let Some(completed) = execution.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(execution.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }

    for step in &execution.results {
        println!(
            "\n  Step {}: {}",
            style(step.step).cyan(),
            format_result_status(step.status)
        );
        for agent in &step.agents {
            println!(
                "    {} {}{}",
                style(&agent.agent_type).bold(),
                format_result_status(agent.status),
                agent
                    .session_id
                    .as_deref()
                    .map(|s| format!(" {}", style(s).dim()))
                    .unwrap_or_default()
            );
            if let Some(error) = &agent.error {
                println!("      {}", style(error).red());
            }
        }
    }

    Ok(())
}
