//! Agent CLI subprocess client
//!
//! Runs an external agent CLI once per invocation, in the execution's
//! working directory, and streams its stdout line by line.

use crate::agent::{
    AgentChunk, AgentClientConfig, AgentError, AgentInvoker, AgentOutput, InvocationContext,
    ProgressCallback,
};
use crate::core::AgentSpec;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Invoker that spawns the configured agent CLI
#[derive(Debug, Clone)]
pub struct SubprocessInvoker {
    config: AgentClientConfig,
}

impl SubprocessInvoker {
    pub fn new(config: AgentClientConfig) -> Self {
        Self { config }
    }

    /// Get the agent executable
    pub fn program(&self) -> &str {
        &self.config.program
    }

    fn command(&self, spec: &AgentSpec, context: &InvocationContext) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(self.config.render_args(spec))
            .current_dir(&context.working_dir)
            .env("PIPELINE_EXECUTION_ID", context.execution_id.to_string())
            .env("PIPELINE_SESSION_ID", &context.session_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(task_id) = &spec.task_id {
            command.env("PIPELINE_TASK_ID", task_id);
        }
        command
    }
}

async fn stop(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!("Agent process already gone: {}", e);
    }
}

#[async_trait]
impl AgentInvoker for SubprocessInvoker {
    async fn invoke(
        &self,
        spec: &AgentSpec,
        context: &InvocationContext,
        cancel: CancellationToken,
        progress: &dyn ProgressCallback,
    ) -> Result<AgentOutput, AgentError> {
        debug!(
            "Spawning {} for {} (prompt length: {})",
            self.config.program,
            spec.agent_type,
            spec.prompt.len()
        );

        let mut child = self.command(spec, context).spawn().map_err(|e| {
            AgentError::Internal(format!("Failed to spawn {}: {}", self.config.program, e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Internal("agent stdout was not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::Internal("agent stderr was not captured".to_string()))?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let phase = spec.phase_or_default();
        let mut lines = BufReader::new(stdout).lines();
        let mut content = String::new();

        let deadline = tokio::time::sleep(Duration::from_secs(self.config.timeout_secs));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    stop(&mut child).await;
                    stderr_task.abort();
                    return Err(AgentError::Cancelled("agent process stopped".to_string()));
                }
                _ = &mut deadline => {
                    stop(&mut child).await;
                    stderr_task.abort();
                    return Err(AgentError::Timeout(self.config.timeout_secs));
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        content.push_str(&line);
                        content.push('\n');
                        progress.on_chunk(AgentChunk::new(phase, format!("{}\n", line)));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        stop(&mut child).await;
                        stderr_task.abort();
                        return Err(AgentError::Internal(format!("Failed to read agent output: {}", e)));
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                stop(&mut child).await;
                stderr_task.abort();
                return Err(AgentError::Cancelled("agent process stopped".to_string()));
            }
            _ = &mut deadline => {
                stop(&mut child).await;
                stderr_task.abort();
                return Err(AgentError::Timeout(self.config.timeout_secs));
            }
            status = child.wait() => status.map_err(|e| {
                AgentError::Internal(format!("Failed to wait for {}: {}", self.config.program, e))
            })?,
        };

        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            warn!(
                "{} exited with code {}: {}",
                self.config.program,
                exit_code,
                stderr.trim()
            );
            return Err(AgentError::Api(format!(
                "{} exited with code {}: {}",
                self.config.program,
                exit_code,
                stderr.trim()
            )));
        }

        debug!(
            "{} returned {} bytes of output",
            self.config.program,
            content.len()
        );

        Ok(AgentOutput::new(content))
    }
}
