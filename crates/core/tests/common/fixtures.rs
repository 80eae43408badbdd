//! Test fixtures: settings, engines and on-disk projects.

use dk_core::agents::AgentRegistry;
use dk_core::engine::DebateEngine;
use dk_core::transcript::TranscriptStore;
use dk_protocol::config_models::SessionSettings;
use dk_protocol::ipc::Event;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Settings with millisecond backoff so failing agents do not slow tests down.
#[allow(dead_code)]
pub fn fast_settings(max_rounds: u32) -> SessionSettings {
    SessionSettings {
        max_rounds,
        retry_count: 3,
        timeout_secs: 5,
        backoff_ms: 1,
        max_backoff_ms: 4,
        ..SessionSettings::default()
    }
}

/// An engine writing transcripts into `dir`.
#[allow(dead_code)]
pub fn engine(registry: AgentRegistry, settings: SessionSettings, dir: &Path) -> DebateEngine {
    DebateEngine::new(Arc::new(registry), settings, TranscriptStore::new(dir))
}

/// An event channel large enough that no test ever blocks on it.
#[allow(dead_code)]
pub fn events() -> (mpsc::Sender<Event>, mpsc::Receiver<Event>) {
    mpsc::channel(1024)
}

/// Drain every event sent before the senders were dropped.
#[allow(dead_code)]
pub async fn collect_events(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Create a temporary project with a `.debate-kit/` holding two mock
/// agents, a summarizer and a default roster.
///
/// Returns a TempDir that must be kept alive for the test duration.
#[allow(dead_code)]
pub fn create_test_project() -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path();

    std::fs::create_dir_all(root.join(".debate-kit/agents"))?;
    std::fs::create_dir_all(root.join(".debate-kit/rosters"))?;

    let config = r#"
max_rounds = 4
retry_count = 1
backoff_ms = 1
max_backoff_ms = 2
transcript_dir = "out/transcripts"
"#;
    std::fs::write(root.join(".debate-kit/config.toml"), config)?;

    let optimist = r#"---
name: optimist
persona: an early adopter
stance: for
backend: mock
reply: It will work.
color: green
---
Look for the upside."#;

    let skeptic = r#"---
name: skeptic
persona: a veteran operator
stance: against
backend: mock
reply: Prove it.
color: red
---
Ask for evidence."#;

    let summarizer = r#"---
name: summarizer
stance: neutral
backend: mock
reply: Both sides restated their positions.
---
Summarize fairly."#;

    std::fs::write(root.join(".debate-kit/agents/optimist.md"), optimist)?;
    std::fs::write(root.join(".debate-kit/agents/skeptic.md"), skeptic)?;
    std::fs::write(root.join(".debate-kit/agents/summarizer.md"), summarizer)?;

    let roster = r#"
name: default
agents: [optimist, skeptic]
first-speaker: skeptic
"#;
    std::fs::write(root.join(".debate-kit/rosters/default.yaml"), roster)?;

    Ok(temp_dir)
}
