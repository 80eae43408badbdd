//! End-to-end debate sessions driven through the engine with mock agents.

mod common;

use common::*;
use dk_core::agents::{Agent, AgentError, MockAgent, RequestPurpose};
use dk_core::engine::StartRequest;
use dk_core::scheduler::Review;
use dk_protocol::config_models::{SelectionMode, SessionSettings};
use dk_protocol::conversation_models::{StopReason, TurnOrigin};
use dk_protocol::ipc::Event;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_events_mirror_the_transcript() {
    let temp = tempfile::tempdir().unwrap();
    let engine = engine(
        registry(vec![("pro", replying("yes")), ("con", replying("no"))]),
        fast_settings(4),
        temp.path(),
    );
    let (tx, rx) = events();

    let outcome = engine.start(StartRequest::new("tabs or spaces"), tx).await.unwrap();
    let events = collect_events(rx).await;

    assert_eq!(outcome.reason, StopReason::MaxRounds);
    assert_eq!(outcome.rounds, 4);
    assert!(outcome.warnings.is_empty());
    assert_event_sequence(&events, outcome.conversation_id);

    let announced = appended_turns(&events, outcome.conversation_id);
    assert_eq!(announced.len(), 4);
    assert_transcript_matches(engine.store(), &outcome.transcript, &announced).await;

    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert_eq!(parsed.conversation.topic, "tabs or spaces");
    assert_eq!(speakers(&parsed.conversation), ["pro", "con", "pro", "con"]);
    let rounds: Vec<u32> = parsed.conversation.turns.iter().map(|t| t.round).collect();
    assert_eq!(rounds, [1, 2, 3, 4]);

    match events.last().unwrap() {
        Event::ConversationTerminated { rounds, reason, .. } => {
            assert_eq!(*rounds, 4);
            assert_eq!(*reason, StopReason::MaxRounds);
        }
        other => panic!("unexpected last event: {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_failures_are_retried_within_one_turn() {
    let temp = tempfile::tempdir().unwrap();
    let flaky = Arc::new(
        MockAgent::new(
            true,
            vec![
                Err(AgentError::Transport("connection reset".to_string())),
                Err(AgentError::RateLimited("slow down".to_string())),
            ],
        )
        .then_reply("third time lucky"),
    );
    let engine = engine(
        registry(vec![
            ("flaky", flaky.clone() as Arc<dyn Agent>),
            ("steady", replying("ok")),
        ]),
        fast_settings(2),
        temp.path(),
    );
    let (tx, rx) = events();

    let outcome = engine.start(StartRequest::new("retries"), tx).await.unwrap();
    let events = collect_events(rx).await;

    assert_eq!(flaky.calls(), 3);
    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert_eq!(parsed.conversation.turns.len(), 2);
    assert_eq!(parsed.conversation.turns[0].content, "third time lucky");
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::TurnDegraded { .. })),
        0
    );
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let temp = tempfile::tempdir().unwrap();
    let broken = Arc::new(MockAgent::failing(AgentError::Api {
        status: 400,
        message: "bad request".to_string(),
    }));
    let engine = engine(
        registry(vec![
            ("broken", broken.clone() as Arc<dyn Agent>),
            ("steady", replying("ok")),
        ]),
        fast_settings(2),
        temp.path(),
    );
    let (tx, rx) = events();

    let outcome = engine.start(StartRequest::new("errors"), tx).await.unwrap();
    let events = collect_events(rx).await;

    assert_eq!(outcome.reason, StopReason::MaxRounds);
    assert_eq!(broken.calls(), 1);

    let degraded: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            Event::TurnDegraded { attempts, .. } => Some(*attempts),
            _ => None,
        })
        .collect();
    assert_eq!(degraded, [1]);

    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert!(parsed.conversation.turns[0].content.contains("bad request"));
}

#[tokio::test]
async fn test_call_timeout_counts_as_transient() {
    let temp = tempfile::tempdir().unwrap();
    let slow = Arc::new(MockAgent::replying("too late").with_delay(Duration::from_secs(5)));
    let settings = SessionSettings {
        retry_count: 1,
        ..fast_settings(1)
    };
    let mut engine = engine(
        registry(vec![("slow", slow.clone() as Arc<dyn Agent>)]),
        settings,
        temp.path(),
    );
    // one second is the smallest configurable timeout
    engine.settings_mut().timeout_secs = 1;
    let (tx, _rx) = events();

    let outcome = engine.start(StartRequest::new("patience"), tx).await.unwrap();

    assert_eq!(slow.calls(), 2);
    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert!(parsed.conversation.turns[0].content.starts_with("[error] slow"));
}

#[tokio::test]
async fn test_sentinel_must_match_exactly() {
    let temp = tempfile::tempdir().unwrap();
    let engine = engine(
        registry(vec![
            ("a", Arc::new(MockAgent::scripted(["STOP.", " STOP", "Stop", "STOP"])) as Arc<dyn Agent>),
        ]),
        fast_settings(10),
        temp.path(),
    );
    let (tx, _rx) = events();

    let outcome = engine.start(StartRequest::new("stopping"), tx).await.unwrap();

    assert_eq!(outcome.reason, StopReason::Sentinel);
    assert_eq!(outcome.rounds, 4);
    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert_eq!(parsed.conversation.turns.len(), 4);
    assert_eq!(parsed.recorded_rounds, Some(4));
}

#[tokio::test]
async fn test_roster_subset_and_pinned_first_speaker() {
    let temp = tempfile::tempdir().unwrap();
    let engine = engine(
        registry(vec![
            ("a", replying("from a")),
            ("b", replying("from b")),
            ("c", replying("from c")),
        ]),
        fast_settings(3),
        temp.path(),
    );
    let (tx, _rx) = events();

    let request = StartRequest {
        roster: Some(vec!["c".to_string(), "a".to_string()]),
        // position 2 of the roster above
        first_speaker: Some("2".to_string()),
        ..StartRequest::new("subset")
    };
    let outcome = engine.start(request, tx).await.unwrap();

    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert_eq!(speakers(&parsed.conversation), ["a", "c", "a"]);
}

#[tokio::test]
async fn test_several_speakers_per_round() {
    let temp = tempfile::tempdir().unwrap();
    let settings = SessionSettings {
        speakers_per_round: 2,
        ..fast_settings(2)
    };
    let engine = engine(
        registry(vec![
            ("a", replying("from a")),
            ("b", replying("from b")),
            ("c", replying("from c")),
        ]),
        settings,
        temp.path(),
    );
    let (tx, _rx) = events();

    let outcome = engine.start(StartRequest::new("panel"), tx).await.unwrap();

    assert_eq!(outcome.reason, StopReason::MaxRounds);
    assert_eq!(outcome.rounds, 2);
    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert_eq!(speakers(&parsed.conversation), ["a", "b", "c", "a"]);
    let rounds: Vec<u32> = parsed.conversation.turns.iter().map(|t| t.round).collect();
    assert_eq!(rounds, [1, 1, 2, 2]);
}

#[tokio::test]
async fn test_agents_see_history_and_opponent() {
    let temp = tempfile::tempdir().unwrap();
    let first = Arc::new(RecordingAgent::new("opening"));
    let second = Arc::new(RecordingAgent::new("rebuttal"));
    let engine = engine(
        registry(vec![
            ("first", first.clone() as Arc<dyn Agent>),
            ("second", second.clone() as Arc<dyn Agent>),
        ]),
        fast_settings(3),
        temp.path(),
    );
    let (tx, _rx) = events();

    engine.start(StartRequest::new("history"), tx).await.unwrap();

    let seen = first.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].speakers.is_empty());
    assert_eq!(seen[0].opponent.as_deref(), Some("second"));
    assert_eq!(seen[1].contents, ["opening", "rebuttal"]);
    assert_eq!(seen[1].purpose, RequestPurpose::Turn);

    let seen = second.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].topic, "history");
    assert_eq!(seen[0].speakers, ["first"]);
    assert_eq!(seen[0].opponent.as_deref(), Some("first"));
}

#[tokio::test]
async fn test_manual_selection_follows_the_operator() {
    let temp = tempfile::tempdir().unwrap();
    let settings = SessionSettings {
        selection: SelectionMode::Manual,
        ..fast_settings(10)
    };
    let operator = Arc::new(ScriptedOperator::choosing(&["b", "nobody", "1", "B"]));
    let engine = engine(
        registry(vec![("a", replying("from a")), ("b", replying("from b"))]),
        settings,
        temp.path(),
    )
    .with_operator(operator);
    let (tx, _rx) = events();

    let outcome = engine.start(StartRequest::new("manual"), tx).await.unwrap();

    // the unknown answer is asked again; the exhausted script ends the session
    assert_eq!(outcome.reason, StopReason::OperatorStop);
    assert_eq!(outcome.rounds, 3);
    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert_eq!(speakers(&parsed.conversation), ["b", "a", "b"]);
}

#[tokio::test]
async fn test_review_feedback_then_stop() {
    let temp = tempfile::tempdir().unwrap();
    let operator = Arc::new(ScriptedOperator::reviewing(vec![
        Review::Continue,
        Review::Feedback("talk about cost".to_string()),
        Review::Stop,
    ]));
    let engine = engine(
        registry(vec![("a", replying("from a")), ("b", replying("from b"))]),
        fast_settings(10),
        temp.path(),
    )
    .with_operator(operator.clone())
    .with_review(true);
    let (tx, rx) = events();

    let outcome = engine.start(StartRequest::new("reviewed"), tx).await.unwrap();
    let events = collect_events(rx).await;

    assert_eq!(outcome.reason, StopReason::OperatorStop);
    assert_eq!(outcome.rounds, 3);
    assert_eq!(outcome.exit_code(), 0);
    // feedback turns are not reviewed
    assert_eq!(operator.reviewed(), ["a", "b", "a"]);

    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    let turns = &parsed.conversation.turns;
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[2].origin, TurnOrigin::User);
    assert_eq!(turns[2].content, "talk about cost");
    assert_eq!(turns[2].round, 2);
    assert_eq!(turns[3].speaker, "a");
    assert_eq!(turns[3].round, 3);
    assert_gapless(&parsed.conversation);

    assert_eq!(
        count_events(&events, |e| matches!(e, Event::FeedbackInjected { .. })),
        1
    );
}

#[tokio::test]
async fn test_review_is_off_without_the_flag() {
    let temp = tempfile::tempdir().unwrap();
    let operator = Arc::new(ScriptedOperator::reviewing(vec![Review::Stop]));
    let engine = engine(
        registry(vec![("a", replying("from a"))]),
        fast_settings(2),
        temp.path(),
    )
    .with_operator(operator.clone());
    let (tx, _rx) = events();

    let outcome = engine.start(StartRequest::new("unreviewed"), tx).await.unwrap();

    assert_eq!(outcome.reason, StopReason::MaxRounds);
    assert!(operator.reviewed().is_empty());
}

#[tokio::test]
async fn test_unavailable_agents_are_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let engine = engine(
        registry(vec![
            ("a", replying("from a")),
            ("offline", Arc::new(MockAgent::unavailable()) as Arc<dyn Agent>),
            ("c", replying("from c")),
        ]),
        fast_settings(4),
        temp.path(),
    );
    let (tx, _rx) = events();

    let outcome = engine.start(StartRequest::new("offline"), tx).await.unwrap();

    let parsed = engine.store().load(&outcome.transcript).await.unwrap();
    assert_eq!(speakers(&parsed.conversation), ["a", "c", "a", "c"]);
}
