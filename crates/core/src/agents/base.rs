//! Base Agent trait and supporting types.

use async_trait::async_trait;
use dk_protocol::conversation_models::Turn;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// One entry of the history an agent sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub speaker: String,
    pub round: u32,
    pub content: String,
}

impl From<&Turn> for HistoryEntry {
    fn from(turn: &Turn) -> Self {
        Self {
            speaker: turn.speaker.clone(),
            round: turn.round,
            content: turn.content.clone(),
        }
    }
}

/// The agent the responder is arguing against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpponentContext {
    pub name: String,
    pub persona: String,
    pub stance: String,
}

/// What the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestPurpose {
    /// A regular debate turn.
    #[default]
    Turn,
    /// A condensed summary of the whole history.
    Summarize,
}

/// Request handed to [`Agent::respond`].
///
/// Agents receive it by shared reference: the history is a snapshot taken
/// by the engine and cannot be altered by the callee.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub topic: String,
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent: Option<OpponentContext>,
    pub purpose: RequestPurpose,
}

impl AgentRequest {
    pub fn new(topic: impl Into<String>, history: Vec<HistoryEntry>) -> Self {
        Self {
            topic: topic.into(),
            history,
            opponent: None,
            purpose: RequestPurpose::Turn,
        }
    }

    pub fn with_opponent(mut self, opponent: Option<OpponentContext>) -> Self {
        self.opponent = opponent;
        self
    }

    pub fn for_summary(mut self) -> Self {
        self.purpose = RequestPurpose::Summarize;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent not available: {0}")]
    NotAvailable(String),
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("API call failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Stream parsing error: {0}")]
    StreamParseError(String),
    #[error("Execution failed: {0}")]
    ExecutionError(String),
}

impl AgentError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited(_) | Self::Transport(_) | Self::Auth(_)
        )
    }
}

/// The capability every debate participant implements.
///
/// Implementations only talk to their backend; they never touch
/// conversation state.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn check_availability(&self) -> bool;
    async fn respond(&self, request: &AgentRequest) -> Result<String, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAgent {
        available: bool,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        async fn check_availability(&self) -> bool {
            self.available
        }

        async fn respond(&self, request: &AgentRequest) -> Result<String, AgentError> {
            if !self.available {
                return Err(AgentError::NotAvailable("echo agent offline".to_string()));
            }
            Ok(format!("{} turns about {}", request.history.len(), request.topic))
        }
    }

    #[tokio::test]
    async fn test_agent_respond_success() {
        let agent = EchoAgent { available: true };
        let history = vec![HistoryEntry {
            speaker: "a".to_string(),
            round: 1,
            content: "hi".to_string(),
        }];
        let request = AgentRequest::new("rust", history);

        assert!(agent.check_availability().await);
        assert_eq!(agent.respond(&request).await.unwrap(), "1 turns about rust");
        // the caller's snapshot is untouched
        assert_eq!(request.history.len(), 1);
    }

    #[tokio::test]
    async fn test_agent_respond_unavailable() {
        let agent = EchoAgent { available: false };
        let request = AgentRequest::new("rust", Vec::new());

        let result = agent.respond(&request).await;
        assert!(matches!(result, Err(AgentError::NotAvailable(_))));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AgentError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(AgentError::RateLimited("429".to_string()).is_transient());
        assert!(AgentError::Transport("reset".to_string()).is_transient());
        assert!(AgentError::Auth("expired".to_string()).is_transient());

        assert!(!AgentError::NotAvailable("x".to_string()).is_transient());
        assert!(!AgentError::StreamParseError("x".to_string()).is_transient());
        assert!(!AgentError::ExecutionError("x".to_string()).is_transient());
        assert!(!AgentError::Api {
            status: 400,
            message: "bad".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_request_serializes_boundary_shape() {
        let request = AgentRequest::new(
            "topic",
            vec![HistoryEntry {
                speaker: "writer".to_string(),
                round: 2,
                content: "text".to_string(),
            }],
        );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["topic"], "topic");
        assert_eq!(json["history"][0]["speaker"], "writer");
        assert_eq!(json["history"][0]["round"], 2);
        assert_eq!(json["purpose"], "turn");
        assert!(json.get("opponent").is_none());
    }
}
