//! Conversation and turn models.
//!
//! A conversation is an ordered, append-only sequence of turns under one
//! topic. Turns are immutable once recorded; the only mutation a
//! conversation ever sees is an append or a status change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The exact text an agent returns to end the debate.
pub const STOP_SENTINEL: &str = "STOP";

/// Who produced a turn.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnOrigin {
    Agent,
    /// Operator feedback injected between turns.
    User,
    /// Summary seeding a conversation created by a reset.
    Compression,
}

/// One immutable contribution to a conversation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Turn {
    /// Zero-based position; gapless within its conversation.
    pub index: u64,
    pub speaker: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub stance: String,
    pub content: String,
    pub round: u32,
    pub origin: TurnOrigin,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// True iff the content is exactly the stop sentinel.
    ///
    /// No trimming and no case folding: `"stop"`, `"STOP."` and `" STOP"`
    /// are ordinary content.
    pub fn is_sentinel(&self) -> bool {
        self.content == STOP_SENTINEL
    }
}

/// Lifecycle status of a conversation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Accepting appends.
    Active,
    /// Superseded by a reset; read-only from here on.
    Compressed,
    /// Ended by sentinel, round limit, operator or error.
    Terminated,
}

/// Why a session ended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Sentinel,
    MaxRounds,
    OperatorStop,
    NoAgentsAvailable,
    FatalError,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentinel => "sentinel",
            Self::MaxRounds => "max_rounds",
            Self::OperatorStop => "operator_stop",
            Self::NoAgentsAvailable => "no_agents_available",
            Self::FatalError => "fatal_error",
        }
    }

    /// Parse the label written by [`StopReason::as_str`].
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "sentinel" => Some(Self::Sentinel),
            "max_rounds" => Some(Self::MaxRounds),
            "operator_stop" => Some(Self::OperatorStop),
            "no_agents_available" => Some(Self::NoAgentsAvailable),
            "fatal_error" => Some(Self::FatalError),
            _ => None,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation and everything recorded in it so far.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub topic: String,
    /// The conversation this one continues after a reset.
    pub parent_id: Option<Uuid>,
    pub status: ConversationStatus,
    pub turns: Vec<Turn>,
    pub started_at: DateTime<Utc>,
    /// Set once the conversation is compressed into a successor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl Conversation {
    pub fn new(id: Uuid, topic: String, parent_id: Option<Uuid>) -> Self {
        Self {
            id,
            topic,
            parent_id,
            status: ConversationStatus::Active,
            turns: Vec::new(),
            started_at: Utc::now(),
            child_id: None,
            stop_reason: None,
        }
    }

    /// Index the next appended turn will receive.
    pub fn next_index(&self) -> u64 {
        self.turns.len() as u64
    }

    /// Accumulated history size, in characters of turn content.
    pub fn history_size(&self) -> usize {
        self.turns.iter().map(|t| t.content.chars().count()).sum()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }
}
