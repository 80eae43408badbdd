//! Subprocess executor for command-backed agents.
//!
//! The request payload is written to the child's stdin; stdout is read
//! either whole (plain text backends) or line by line as NDJSON.

use crate::agents::base::AgentError;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::Stream;
use tracing::debug;

/// CLI executor for command adapters.
pub struct CliExecutor;

impl CliExecutor {
    fn spawn(command: &str, args: &[String], payload: String) -> Result<Child, AgentError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::ExecutionError(format!("Failed to spawn command '{command}': {e}"))
            })?;

        // stdin is fed concurrently with reading stdout
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    debug!(error = %e, "failed to write request to child stdin");
                }
            });
        }

        Ok(child)
    }

    /// Run `command` to completion and return its stdout.
    ///
    /// A non-zero exit status is reported as a transport failure carrying
    /// the tail of stderr.
    pub async fn run_to_string(
        command: &str,
        args: &[String],
        payload: String,
    ) -> Result<String, AgentError> {
        let child = Self::spawn(command, args, payload)?;
        let output = child.wait_with_output().await.map_err(|e| {
            AgentError::ExecutionError(format!("Failed to wait for '{command}': {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Transport(format!(
                "'{}' exited with {}: {}",
                command,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| AgentError::StreamParseError(format!("stdout is not UTF-8: {e}")))
    }

    /// Execute a command and parse its stdout as NDJSON.
    ///
    /// Empty lines are skipped. Lines that fail to parse yield
    /// `AgentError::StreamParseError`; a non-zero exit status is yielded as
    /// a final transport error.
    pub fn execute(
        command: String,
        args: Vec<String>,
        payload: String,
    ) -> Pin<Box<dyn Stream<Item = Result<serde_json::Value, AgentError>> + Send>> {
        let stream = async_stream::stream! {
            let mut child = match CliExecutor::spawn(&command, &args, payload) {
                Ok(child) => child,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let stdout = match child.stdout.take() {
                Some(stdout) => stdout,
                None => {
                    yield Err(AgentError::ExecutionError(
                        "Failed to capture stdout".to_string()
                    ));
                    return;
                }
            };

            let mut lines = BufReader::new(stdout).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(value) => yield Ok(value),
                    Err(e) => {
                        yield Err(AgentError::StreamParseError(format!(
                            "Failed to parse JSON: {} (line: {})",
                            e, line
                        )));
                    }
                }
            }

            match child.wait().await {
                Ok(status) if !status.success() => {
                    yield Err(AgentError::Transport(format!(
                        "'{}' exited with {}",
                        command, status
                    )));
                }
                Ok(_) => {}
                Err(e) => {
                    yield Err(AgentError::ExecutionError(format!(
                        "Failed to wait for '{}': {}",
                        command, e
                    )));
                }
            }
        };

        Box::pin(stream)
    }
}
