//! Independent sessions running side by side.

mod common;

use common::*;
use dk_core::agents::{Agent, MockAgent};
use dk_core::engine::{ResumeRequest, StartRequest};
use dk_core::state::{SessionManager, SessionSpec};
use dk_core::transcript::{OpenOutcome, TranscriptStore};
use dk_protocol::config_models::SessionSettings;
use dk_protocol::conversation_models::{ConversationStatus, StopReason};
use std::sync::Arc;
use std::time::Duration;

fn slow(reply: &str, millis: u64) -> Arc<dyn Agent> {
    Arc::new(MockAgent::replying(reply).with_delay(Duration::from_millis(millis)))
}

#[tokio::test]
async fn test_sessions_do_not_interleave() {
    let temp = tempfile::tempdir().unwrap();
    let engine = engine(
        registry(vec![("a", slow("from a", 3)), ("b", slow("from b", 2))]),
        fast_settings(5),
        temp.path(),
    );
    let (tx, rx) = events();

    let mut manager = SessionManager::new(engine, tx);
    let topics = ["alpha", "beta", "gamma", "delta"];
    for topic in topics {
        manager.spawn(SessionSpec::Start(StartRequest::new(topic)));
    }
    assert_eq!(manager.len(), topics.len());

    let results = manager.join_all().await;
    drop(manager);
    let events = collect_events(rx).await;

    let store = TranscriptStore::new(temp.path());
    let mut seen_topics = Vec::new();
    for result in results {
        let outcome = result.unwrap();
        assert_eq!(outcome.reason, StopReason::MaxRounds);
        assert_eq!(outcome.rounds, 5);

        let parsed = store.load(&outcome.transcript).await.unwrap();
        assert_eq!(parsed.conversation.id, outcome.conversation_id);
        assert_eq!(speakers(&parsed.conversation), ["a", "b", "a", "b", "a"]);
        assert_gapless(&parsed.conversation);

        assert_event_sequence(&events, outcome.conversation_id);
        let announced = appended_turns(&events, outcome.conversation_id);
        assert_transcript_matches(&store, &outcome.transcript, &announced).await;

        seen_topics.push(parsed.conversation.topic);
    }

    seen_topics.sort();
    assert_eq!(seen_topics, ["alpha", "beta", "delta", "gamma"]);
    assert_eq!(store.transcripts().await.unwrap().len(), topics.len());
}

#[tokio::test]
async fn test_one_failing_session_does_not_affect_others() {
    let temp = tempfile::tempdir().unwrap();
    let engine = engine(
        registry(vec![("a", slow("from a", 1)), ("b", slow("from b", 1))]),
        fast_settings(3),
        temp.path(),
    );
    let (tx, _rx) = events();

    let mut manager = SessionManager::new(engine, tx);
    manager.spawn(SessionSpec::Start(StartRequest::new("fine")));
    manager.spawn(SessionSpec::Start(StartRequest {
        roster: Some(vec!["ghost".to_string()]),
        ..StartRequest::new("broken")
    }));
    manager.spawn(SessionSpec::Resume(ResumeRequest::new(uuid::Uuid::new_v4())));

    let results = manager.join_all().await;
    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let codes: Vec<u8> = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .map(|e| e.exit_code())
        .collect();
    // an unknown agent is a config error; a missing topic fails in storage
    assert!(codes.contains(&2));
    assert!(codes.contains(&1));
}

#[tokio::test]
async fn test_shutdown_leaves_sessions_resumable() {
    let temp = tempfile::tempdir().unwrap();
    let settings = SessionSettings {
        timeout_secs: 60,
        ..fast_settings(50)
    };
    let engine = engine(
        registry(vec![("a", slow("from a", 20)), ("b", slow("from b", 20))]),
        settings,
        temp.path(),
    );
    let (tx, _rx) = events();

    let mut manager = SessionManager::new(engine, tx);
    manager.spawn(SessionSpec::Start(StartRequest::new("interrupted")));
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.shutdown().await;
    assert!(manager.is_empty());

    let store = TranscriptStore::new(temp.path());
    let infos = store.list().await.unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].status, ConversationStatus::Active);

    match store.open_or_create(infos[0].id, None).await.unwrap() {
        OpenOutcome::Resumed { handle, .. } => {
            assert_eq!(handle.id(), infos[0].id);
            assert_gapless(handle.conversation());
        }
        other => panic!("expected a resumable conversation, got {other:?}"),
    }
}
