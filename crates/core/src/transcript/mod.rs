//! Durable, append-only conversation transcripts.
//!
//! One plain-text file per conversation. Every block is flushed to storage
//! before the call that wrote it returns, so the file is always the source
//! of truth for resume.

pub mod format;
mod store;

pub use format::{Block, FormatError, ParsedTranscript, FEEDBACK_LABEL, RULE, USER_SPEAKER};
pub use store::{ConversationHandle, OpenOutcome, TranscriptInfo, TranscriptStore};

use dk_protocol::conversation_models::{ConversationStatus, TurnOrigin};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("I/O error on transcript {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed transcript {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("Conversation {id} is {status:?} and accepts no more writes")]
    NotActive {
        id: Uuid,
        status: ConversationStatus,
    },

    #[error("Conversation {0} does not exist and no topic was given to create it")]
    MissingTopic(Uuid),

    #[error("Could not find a free transcript file name for {0}")]
    NameExhausted(PathBuf),

    #[error("Transcript {0} holds a partial write that could not be rolled back")]
    Poisoned(PathBuf),
}

impl TranscriptError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A turn about to be appended. Index and timestamp are assigned on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnDraft {
    pub speaker: String,
    pub persona: String,
    pub stance: String,
    pub content: String,
    pub round: u32,
    pub origin: TurnOrigin,
}

impl TurnDraft {
    pub fn agent(speaker: impl Into<String>, content: impl Into<String>, round: u32) -> Self {
        Self {
            speaker: speaker.into(),
            persona: String::new(),
            stance: String::new(),
            content: content.into(),
            round,
            origin: TurnOrigin::Agent,
        }
    }

    pub fn user(content: impl Into<String>, round: u32) -> Self {
        Self {
            origin: TurnOrigin::User,
            ..Self::agent(USER_SPEAKER, content, round)
        }
    }

    /// The summary seeding a conversation created by a reset.
    pub fn compression(summarizer: impl Into<String>, summary: impl Into<String>, round: u32) -> Self {
        Self {
            origin: TurnOrigin::Compression,
            ..Self::agent(summarizer, summary, round)
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>, stance: impl Into<String>) -> Self {
        self.persona = persona.into();
        self.stance = stance.into();
        self
    }
}
