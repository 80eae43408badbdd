//! Agent definition models for `.debate-kit/agents/*.md`.
//!
//! Agents are defined as Markdown files with YAML front matter. The front
//! matter carries persona and backend metadata; the body carries the
//! persona instructions injected into every request the agent builds.

use serde::{Deserialize, Serialize};

/// Which external backend an agent talks to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible chat-completions endpoint over HTTP.
    Http,
    /// A local command that reads the request JSON on stdin.
    Command,
    /// Scripted replies, for dry runs and tests.
    #[default]
    Mock,
}

impl BackendKind {
    /// Get a human-readable name for the backend kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Command => "command",
            Self::Mock => "mock",
        }
    }
}

/// How a command backend reports its answer on stdout.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The whole of stdout is the response.
    #[default]
    Text,
    /// One JSON event per line (`message`, `error`, `done`).
    Ndjson,
}

/// A debate participant's configuration.
///
/// # Example
///
/// ```markdown
/// ---
/// name: challenger
/// description: Pokes holes in the proposal
/// persona: an investigative strategist
/// stance: challenge the proposition
/// backend: http
/// model: gpt-4o-mini
/// endpoint: https://api.example.com/v1/chat/completions
/// api_key_env: CHALLENGER_API_KEY
/// ---
///
/// Question every assumption and ask for evidence.
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    /// Unique identifier, also used as the speaker id in transcripts.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Persona label, e.g. "a pragmatic solution architect".
    #[serde(default)]
    pub persona: String,

    /// Position the agent argues from, e.g. "defend the proposition".
    #[serde(default)]
    pub stance: String,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub model: String,

    /// Chat-completions URL for `http` backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Name of the environment variable holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Program to spawn for `command` backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default)]
    pub output: OutputFormat,

    /// Canned reply for `mock` backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Per-agent call timeout, overriding the session default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Disabled agents stay in the roster but are never scheduled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Terminal color hint for the CLI.
    #[serde(default)]
    pub color: String,

    /// The markdown body of the definition file.
    ///
    /// Not part of the front matter, so it is skipped by serde.
    #[serde(skip)]
    pub instructions: String,
}

fn default_enabled() -> bool {
    true
}

impl AgentDefinition {
    /// Create a minimal mock definition, mostly useful in tests.
    pub fn mock(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            persona: String::new(),
            stance: String::new(),
            backend: BackendKind::Mock,
            model: String::new(),
            endpoint: None,
            api_key_env: None,
            command: None,
            args: Vec::new(),
            output: OutputFormat::Text,
            reply: Some(reply.to_string()),
            temperature: None,
            timeout_secs: None,
            enabled: true,
            color: String::new(),
            instructions: String::new(),
        }
    }
}
