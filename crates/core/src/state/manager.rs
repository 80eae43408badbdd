//! Concurrent sessions.
//!
//! The [`SessionManager`] runs independent debates side by side, one tokio
//! task each. Sessions share the immutable agent registry through the
//! engine and nothing else: every task owns its conversation handle.

use crate::engine::{DebateEngine, ResumeRequest, SessionError, SessionOutcome, StartRequest};
use dk_protocol::ipc::Event;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// What a spawned session should do.
#[derive(Debug, Clone)]
pub enum SessionSpec {
    Start(StartRequest),
    Resume(ResumeRequest),
}

pub type SessionResult = Result<SessionOutcome, SessionError>;

pub struct SessionManager {
    engine: Arc<DebateEngine>,
    events_tx: mpsc::Sender<Event>,
    sessions: JoinSet<SessionResult>,
}

impl SessionManager {
    pub fn new(engine: DebateEngine, events_tx: mpsc::Sender<Event>) -> Self {
        Self {
            engine: Arc::new(engine),
            events_tx,
            sessions: JoinSet::new(),
        }
    }

    /// Spawn a session in the background.
    pub fn spawn(&mut self, spec: SessionSpec) {
        let engine = Arc::clone(&self.engine);
        let events_tx = self.events_tx.clone();

        debug!(spec = ?spec, "spawning session");
        self.sessions.spawn(async move {
            match spec {
                SessionSpec::Start(request) => engine.start(request, events_tx).await,
                SessionSpec::Resume(request) => engine.resume(request, events_tx).await,
            }
        });
    }

    /// Sessions still running.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Wait for the next session to end, in completion order.
    pub async fn join_next(&mut self) -> Option<SessionResult> {
        let joined = self.sessions.join_next().await?;
        Some(joined.unwrap_or_else(|e| {
            error!(error = %e, "session task failed");
            Err(SessionError::Task(e.to_string()))
        }))
    }

    /// Wait for every session, in completion order.
    pub async fn join_all(&mut self) -> Vec<SessionResult> {
        let mut results = Vec::with_capacity(self.sessions.len());
        while let Some(result) = self.join_next().await {
            results.push(result);
        }
        results
    }

    /// Cancel every running session.
    ///
    /// Cancelled sessions leave their transcripts active, so they can be
    /// resumed later.
    pub async fn shutdown(&mut self) {
        self.sessions.shutdown().await;
    }
}
