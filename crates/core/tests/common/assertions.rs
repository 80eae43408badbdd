//! Custom assertion helpers for the integration tests.

use dk_core::transcript::TranscriptStore;
use dk_protocol::conversation_models::{Conversation, Turn};
use dk_protocol::ipc::Event;
use std::path::Path;
use uuid::Uuid;

/// Turn indices start at 0 and have no gaps or duplicates.
#[allow(dead_code)]
pub fn assert_gapless(conversation: &Conversation) {
    for (expected, turn) in conversation.turns.iter().enumerate() {
        assert_eq!(
            turn.index, expected as u64,
            "turn {} of {} has index {}",
            expected, conversation.id, turn.index
        );
    }
}

/// The transcript at `path` parses back to exactly `turns`.
///
/// Compares what the text format carries: index, speaker, origin, round
/// and content.
#[allow(dead_code)]
pub async fn assert_transcript_matches(store: &TranscriptStore, path: &Path, turns: &[Turn]) {
    let parsed = store.load(path).await.unwrap();
    let stored = &parsed.conversation.turns;
    assert_eq!(stored.len(), turns.len(), "turn count in {}", path.display());

    for (stored, expected) in stored.iter().zip(turns) {
        assert_eq!(stored.index, expected.index);
        assert_eq!(stored.speaker, expected.speaker);
        assert_eq!(stored.origin, expected.origin);
        assert_eq!(stored.round, expected.round);
        assert_eq!(stored.content, expected.content);
    }
    assert_gapless(&parsed.conversation);
}

/// Speakers of the recorded turns, in order.
#[allow(dead_code)]
pub fn speakers(conversation: &Conversation) -> Vec<&str> {
    conversation.turns.iter().map(|t| t.speaker.as_str()).collect()
}

/// Turns announced through `TurnAppended`, for one conversation.
#[allow(dead_code)]
pub fn appended_turns(events: &[Event], id: Uuid) -> Vec<Turn> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::TurnAppended {
                conversation_id,
                turn,
            } if *conversation_id == id => Some(turn.clone()),
            _ => None,
        })
        .collect()
}

/// Every conversation's events open with `ConversationStarted` and close
/// with `ConversationTerminated`, with nothing after the close.
#[allow(dead_code)]
pub fn assert_event_sequence(events: &[Event], id: Uuid) {
    let own: Vec<&Event> = events.iter().filter(|e| event_conversation(e) == id).collect();
    assert!(!own.is_empty(), "no events for {id}");

    assert!(
        matches!(own[0], Event::ConversationStarted { .. }),
        "first event for {id} should be ConversationStarted, got: {:?}",
        own[0]
    );
    let last = own[own.len() - 1];
    assert!(
        matches!(last, Event::ConversationTerminated { .. }),
        "last event for {id} should be ConversationTerminated, got: {last:?}"
    );
}

/// The conversation an event is about. Resets belong to the conversation
/// that continues.
#[allow(dead_code)]
pub fn event_conversation(event: &Event) -> Uuid {
    match event {
        Event::ConversationStarted {
            conversation_id, ..
        }
        | Event::TurnAppended {
            conversation_id, ..
        }
        | Event::TurnDegraded {
            conversation_id, ..
        }
        | Event::FeedbackInjected {
            conversation_id, ..
        }
        | Event::CompressionSkipped {
            conversation_id, ..
        }
        | Event::ConversationTerminated {
            conversation_id, ..
        } => *conversation_id,
        Event::ConversationReset {
            new_conversation_id,
            ..
        } => *new_conversation_id,
    }
}

/// Count events matching `pred`.
#[allow(dead_code)]
pub fn count_events(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}
