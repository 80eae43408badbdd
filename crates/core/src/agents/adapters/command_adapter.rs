//! Adapter for agents backed by a local command.
//!
//! The command receives one JSON document on stdin:
//!
//! ```json
//! {
//!   "agent": { "name": "...", "persona": "...", "stance": "...", "instructions": "..." },
//!   "topic": "...",
//!   "history": [{ "speaker": "...", "round": 1, "content": "..." }],
//!   "opponent": { "name": "...", "persona": "...", "stance": "..." },
//!   "purpose": "turn",
//!   "prompt": "..."
//! }
//! ```
//!
//! With `output: text` all of stdout is the answer. With `output: ndjson`
//! stdout carries one event per line:
//! `{"type":"message","text":"..."}`, `{"type":"error","message":"..."}`
//! and an optional `{"type":"done"}`.

use crate::agents::base::{Agent, AgentError, AgentRequest};
use crate::agents::cli_executor::CliExecutor;
use crate::agents::prompt::{render_prompt, Persona};
use async_trait::async_trait;
use dk_protocol::agent_models::{AgentDefinition, OutputFormat};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

#[derive(Serialize)]
struct CommandRequest<'a> {
    agent: &'a Persona,
    #[serde(flatten)]
    request: &'a AgentRequest,
    prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum CommandEvent {
    Message { text: String },
    Error { message: String },
    Done,
    #[serde(other)]
    Other,
}

pub struct CommandAdapter {
    persona: Persona,
    command: String,
    args: Vec<String>,
    output: OutputFormat,
}

impl CommandAdapter {
    pub fn new(persona: Persona, command: String, args: Vec<String>, output: OutputFormat) -> Self {
        Self {
            persona,
            command,
            args,
            output,
        }
    }

    pub fn from_definition(definition: &AgentDefinition) -> Result<Self, AgentError> {
        let command = definition.command.clone().ok_or_else(|| {
            AgentError::NotAvailable(format!(
                "Agent '{}' uses the command backend but names no command",
                definition.name
            ))
        })?;
        Ok(Self::new(
            Persona::from(definition),
            command,
            definition.args.clone(),
            definition.output,
        ))
    }

    fn payload(&self, request: &AgentRequest) -> Result<String, AgentError> {
        let body = CommandRequest {
            agent: &self.persona,
            request,
            prompt: render_prompt(&self.persona, request),
        };
        serde_json::to_string(&body)
            .map_err(|e| AgentError::ExecutionError(format!("JSON serialize error: {e}")))
    }

    async fn respond_ndjson(&self, payload: String) -> Result<String, AgentError> {
        let mut stream = CliExecutor::execute(self.command.clone(), self.args.clone(), payload);
        let mut text = String::new();
        let mut saw_message = false;

        while let Some(value) = stream.next().await {
            let event: CommandEvent = serde_json::from_value(value?)
                .map_err(|e| AgentError::StreamParseError(format!("Unexpected event: {e}")))?;

            match event {
                CommandEvent::Message { text: chunk } => {
                    saw_message = true;
                    text.push_str(&chunk);
                }
                CommandEvent::Error { message } => return Err(AgentError::ExecutionError(message)),
                CommandEvent::Done => break,
                CommandEvent::Other => {}
            }
        }

        if !saw_message {
            return Err(AgentError::StreamParseError(format!(
                "'{}' produced no message events",
                self.command
            )));
        }
        Ok(text)
    }
}

/// Drop the single line terminator most programs end their output with.
fn strip_trailing_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

#[async_trait]
impl Agent for CommandAdapter {
    async fn check_availability(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    async fn respond(&self, request: &AgentRequest) -> Result<String, AgentError> {
        let payload = self.payload(request)?;

        match self.output {
            OutputFormat::Text => CliExecutor::run_to_string(&self.command, &self.args, payload)
                .await
                .map(strip_trailing_newline),
            OutputFormat::Ndjson => self.respond_ndjson(payload).await,
        }
    }
}
