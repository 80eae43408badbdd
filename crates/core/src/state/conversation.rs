//! Conversation lifecycle notifications.
//!
//! Each helper reports one state change of a conversation on the event
//! channel. A closed channel never interrupts a session.

use crate::transcript::ConversationHandle;
use dk_protocol::conversation_models::{StopReason, Turn};
use dk_protocol::ipc::Event;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

/// Announce a created or reopened conversation.
pub async fn announce_started(handle: &ConversationHandle, resumed: bool, events_tx: &Sender<Event>) {
    let conversation = handle.conversation();
    let _ = events_tx
        .send(Event::ConversationStarted {
            conversation_id: conversation.id,
            topic: conversation.topic.clone(),
            parent_id: conversation.parent_id,
            transcript: handle.path().to_path_buf(),
            resumed,
        })
        .await;
}

pub async fn record_turn(conversation_id: Uuid, turn: &Turn, events_tx: &Sender<Event>) {
    let _ = events_tx
        .send(Event::TurnAppended {
            conversation_id,
            turn: turn.clone(),
        })
        .await;
}

/// Report a slot filled with a diagnostic turn after the adapter gave up.
///
/// The diagnostic turn itself is reported separately through [`record_turn`].
pub async fn record_degraded(
    conversation_id: Uuid,
    speaker: &str,
    attempts: u32,
    error: String,
    events_tx: &Sender<Event>,
) {
    let _ = events_tx
        .send(Event::TurnDegraded {
            conversation_id,
            speaker: speaker.to_string(),
            attempts,
            error,
        })
        .await;
}

pub async fn record_feedback(conversation_id: Uuid, turn: &Turn, events_tx: &Sender<Event>) {
    let _ = events_tx
        .send(Event::FeedbackInjected {
            conversation_id,
            turn: turn.clone(),
        })
        .await;
}

/// Report that continuity moved from `old` to the conversation behind `handle`.
pub async fn record_reset(
    old: Uuid,
    handle: &ConversationHandle,
    summary_chars: usize,
    events_tx: &Sender<Event>,
) {
    let _ = events_tx
        .send(Event::ConversationReset {
            old_conversation_id: old,
            new_conversation_id: handle.id(),
            transcript: handle.path().to_path_buf(),
            summary_chars,
        })
        .await;
}

pub async fn record_skipped(conversation_id: Uuid, reason: String, events_tx: &Sender<Event>) {
    let _ = events_tx
        .send(Event::CompressionSkipped {
            conversation_id,
            reason,
        })
        .await;
}

pub async fn finish(conversation_id: Uuid, rounds: u32, reason: StopReason, events_tx: &Sender<Event>) {
    let _ = events_tx
        .send(Event::ConversationTerminated {
            conversation_id,
            rounds,
            reason,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptStore;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_helpers_emit_events() {
        let temp = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(temp.path());
        let handle = store.create(Uuid::new_v4(), "topic", None).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        announce_started(&handle, false, &tx).await;
        finish(handle.id(), 2, StopReason::Sentinel, &tx).await;

        match rx.recv().await.unwrap() {
            Event::ConversationStarted {
                conversation_id,
                resumed,
                transcript,
                ..
            } => {
                assert_eq!(conversation_id, handle.id());
                assert!(!resumed);
                assert_eq!(transcript, handle.path());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::ConversationTerminated {
                rounds: 2,
                reason: StopReason::Sentinel,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        finish(Uuid::new_v4(), 1, StopReason::MaxRounds, &tx).await;
    }
}
