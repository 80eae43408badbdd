//! Events emitted by the debate engine.
//!
//! The engine reports every state change on a channel so a front end (the
//! CLI today) can render progress without touching conversation state.
//!
//! Uses tagged enum serialization:
//! ```json
//! {
//!   "type": "turnAppended",
//!   "payload": {
//!     "conversation_id": "uuid-here",
//!     "turn": { "index": 3, "speaker": "challenger", ... }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::conversation_models::{StopReason, Turn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A conversation was created or reopened.
    ConversationStarted {
        conversation_id: Uuid,
        topic: String,
        parent_id: Option<Uuid>,
        transcript: PathBuf,
        resumed: bool,
    },

    /// A turn was durably recorded.
    TurnAppended { conversation_id: Uuid, turn: Turn },

    /// An adapter call failed for good; a diagnostic turn fills the slot.
    TurnDegraded {
        conversation_id: Uuid,
        speaker: String,
        attempts: u32,
        error: String,
    },

    /// Operator feedback was recorded as a user turn.
    FeedbackInjected { conversation_id: Uuid, turn: Turn },

    /// Continuity moved to a new conversation.
    ConversationReset {
        old_conversation_id: Uuid,
        new_conversation_id: Uuid,
        transcript: PathBuf,
        summary_chars: usize,
    },

    /// A compression attempt failed; the conversation continues as is.
    CompressionSkipped { conversation_id: Uuid, reason: String },

    /// The session ended.
    ConversationTerminated {
        conversation_id: Uuid,
        rounds: u32,
        reason: StopReason,
    },
}
