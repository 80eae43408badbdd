//! Debate engine.
//!
//! A [`DebateEngine`] runs one session at a time per call: it owns the
//! active conversation handle, asks the scheduler for a speaker, calls the
//! speaker's adapter through the retry wrapper, appends the reply, checks
//! for termination and compression, and lets an operator review the turn.
//! Every state change is reported on the event channel.
//!
//! ```text
//! select ─▶ call (retry) ─▶ append ─▶ terminal? ─▶ compress? ─▶ review ─┐
//!    ▲                                                                   │
//!    └───────────────────────────────────────────────────────────────────┘
//! ```

use crate::agents::base::AgentRequest;
use crate::agents::registry::{AgentDescriptor, AgentRegistry, RegistryError};
use crate::agents::retry::{call_with_retry, CallOutcome, RetryPolicy};
use crate::compression::{CompressionManager, CompressionPolicy, CompressionResult};
use crate::config::AppConfig;
use crate::scheduler::{Operator, Review, RoundState, Scheduler};
use crate::state::conversation::{
    announce_started, finish, record_degraded, record_feedback, record_reset, record_skipped,
    record_turn,
};
use crate::transcript::{ConversationHandle, OpenOutcome, TranscriptError, TranscriptStore, TurnDraft};
use dk_protocol::config_models::SessionSettings;
use dk_protocol::conversation_models::{StopReason, Turn};
use dk_protocol::ipc::Event;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Errors that end a session without a regular stop reason.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Persistence(#[from] TranscriptError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session task failed: {0}")]
    Task(String),
}

impl From<RegistryError> for SessionError {
    fn from(e: RegistryError) -> Self {
        Self::Config(e.to_string())
    }
}

impl SessionError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Persistence(_) | Self::Task(_) => 1,
            Self::Config(_) => 2,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// The conversation that was active at the end.
    pub conversation_id: Uuid,
    pub rounds: u32,
    pub reason: StopReason,
    pub transcript: PathBuf,
    /// Recoverable problems met while opening the conversation.
    pub warnings: Vec<String>,
}

impl SessionOutcome {
    pub fn exit_code(&self) -> u8 {
        match self.reason {
            StopReason::Sentinel | StopReason::MaxRounds | StopReason::OperatorStop => 0,
            StopReason::FatalError => 1,
            StopReason::NoAgentsAvailable => 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartRequest {
    pub topic: String,
    /// Id, display name or 1-based roster position.
    pub first_speaker: Option<String>,
    pub max_rounds: Option<u32>,
    /// Agent ids taking part; `None` means every configured agent.
    pub roster: Option<Vec<String>>,
}

impl StartRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeRequest {
    pub conversation_id: Uuid,
    /// Needed only when the conversation has to be created or recreated.
    pub topic: Option<String>,
    pub max_rounds: Option<u32>,
    pub roster: Option<Vec<String>>,
}

impl ResumeRequest {
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            topic: None,
            max_rounds: None,
            roster: None,
        }
    }
}

#[derive(Clone)]
pub struct DebateEngine {
    /// Every configured agent; sessions run on a subset.
    registry: Arc<AgentRegistry>,
    settings: SessionSettings,
    store: TranscriptStore,
    operator: Option<Arc<dyn Operator>>,
    review: bool,
}

impl DebateEngine {
    pub fn new(registry: Arc<AgentRegistry>, settings: SessionSettings, store: TranscriptStore) -> Self {
        Self {
            registry,
            settings,
            store,
            operator: None,
            review: false,
        }
    }

    /// Build the registry and store described by a loaded configuration.
    pub fn from_config(config: &AppConfig, root: &Path) -> Result<Self, SessionError> {
        let registry = AgentRegistry::from_definitions(&config.agents)?;
        let store = TranscriptStore::new(config.transcript_dir(root));
        Ok(Self::new(Arc::new(registry), config.settings.clone(), store))
    }

    /// Operator used for manual speaker selection and, with
    /// [`with_review`](Self::with_review), for reviewing each turn.
    pub fn with_operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn with_review(mut self, review: bool) -> Self {
        self.review = review;
        self
    }

    pub fn settings_mut(&mut self) -> &mut SessionSettings {
        &mut self.settings
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    /// Run a new conversation on `request.topic` until it stops.
    pub async fn start(
        &self,
        request: StartRequest,
        events_tx: Sender<Event>,
    ) -> Result<SessionOutcome, SessionError> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(SessionError::Config("topic must not be empty".to_string()));
        }

        let session = self.session(
            request.roster.as_deref(),
            request.first_speaker.as_deref(),
            request.max_rounds,
            events_tx,
        )?;

        let handle = self.store.create(Uuid::new_v4(), topic, None).await?;
        info!(conversation_id = %handle.id(), topic = %topic, "starting debate");
        announce_started(&handle, false, &session.events_tx).await;

        session.drive(handle, RoundState::default(), Vec::new()).await
    }

    /// Continue conversation `request.conversation_id` from its transcript.
    ///
    /// A terminated conversation is reported as it ended; no turn is run.
    pub async fn resume(
        &self,
        request: ResumeRequest,
        events_tx: Sender<Event>,
    ) -> Result<SessionOutcome, SessionError> {
        let session = self.session(request.roster.as_deref(), None, request.max_rounds, events_tx)?;
        let spr = session.scheduler.speakers_per_round();

        let outcome = self
            .store
            .open_or_create(request.conversation_id, request.topic.as_deref())
            .await?;

        let (handle, state, warnings) = match outcome {
            OpenOutcome::Resumed { handle, warnings } => {
                for warning in &warnings {
                    warn!(conversation_id = %handle.id(), "{warning}");
                }
                let state = RoundState::from_conversation(handle.conversation(), spr);
                announce_started(&handle, true, &session.events_tx).await;
                (handle, state, warnings)
            }
            OpenOutcome::Created(handle) => {
                announce_started(&handle, false, &session.events_tx).await;
                (handle, RoundState::default(), Vec::new())
            }
            OpenOutcome::Recovered { handle, warning } => {
                warn!(conversation_id = %handle.id(), "{warning}");
                announce_started(&handle, false, &session.events_tx).await;
                (handle, RoundState::default(), vec![warning])
            }
            OpenOutcome::Finished {
                conversation,
                path,
                rounds,
            } => {
                let reason = conversation.stop_reason.unwrap_or(StopReason::FatalError);
                info!(conversation_id = %conversation.id, reason = %reason, "conversation already finished");
                finish(conversation.id, rounds, reason, &session.events_tx).await;
                return Ok(SessionOutcome {
                    conversation_id: conversation.id,
                    rounds,
                    reason,
                    transcript: path,
                    warnings: Vec::new(),
                });
            }
        };

        info!(
            conversation_id = %handle.id(),
            round = state.round,
            turns = handle.conversation().turns.len(),
            "resuming debate"
        );
        session.drive(handle, state, warnings).await
    }

    fn session(
        &self,
        roster: Option<&[String]>,
        first_speaker: Option<&str>,
        max_rounds: Option<u32>,
        events_tx: Sender<Event>,
    ) -> Result<Session, SessionError> {
        let lineup = match roster {
            Some(names) if !names.is_empty() => self.registry.subset(names)?,
            _ => (*self.registry).clone(),
        };

        let max_rounds = max_rounds.unwrap_or(self.settings.max_rounds);
        if max_rounds == 0 {
            return Err(SessionError::Config("max_rounds must be at least 1".to_string()));
        }

        let first_speaker = match first_speaker.or(self.settings.first_speaker.as_deref()) {
            Some(key) => Some(
                lineup
                    .resolve(key)
                    .map(|d| d.id.clone())
                    .ok_or_else(|| {
                        SessionError::Config(format!("first speaker '{key}' is not in the roster"))
                    })?,
            ),
            None => None,
        };

        let summarizer: Option<AgentDescriptor> = match self.settings.summarizer.as_deref() {
            Some(name) => Some(self.registry.get(name).cloned().ok_or_else(|| {
                SessionError::Config(format!("summarizer '{name}' is not a configured agent"))
            })?),
            None => None,
        };

        let retry = RetryPolicy::from_settings(&self.settings);
        let compression = CompressionManager::new(
            CompressionPolicy {
                threshold: self.settings.compression_threshold,
                summarizer: summarizer.as_ref().map(|d| d.id.clone()),
            },
            summarizer,
            retry.clone(),
        );

        let scheduler = Scheduler::new(lineup.ids(), max_rounds)
            .with_selection(self.settings.selection)
            .with_first_speaker(first_speaker)
            .with_speakers_per_round(self.settings.speakers_per_round)
            .with_operator(self.operator.clone());

        Ok(Session {
            store: self.store.clone(),
            lineup,
            scheduler,
            compression,
            retry,
            review: self.review && self.operator.is_some(),
            events_tx,
        })
    }
}

/// One running session. Owns nothing shared except the event sender.
struct Session {
    store: TranscriptStore,
    lineup: AgentRegistry,
    scheduler: Scheduler,
    compression: CompressionManager,
    retry: RetryPolicy,
    review: bool,
    events_tx: Sender<Event>,
}

impl Session {
    async fn drive(
        mut self,
        mut handle: ConversationHandle,
        mut state: RoundState,
        warnings: Vec<String>,
    ) -> Result<SessionOutcome, SessionError> {
        let spr = self.scheduler.speakers_per_round();
        let mut rounds = if state.slot > 0 {
            state.round
        } else {
            state.round.saturating_sub(1)
        };

        loop {
            if state.slot == 0 && state.round > self.scheduler.max_rounds() {
                return self.conclude(handle, StopReason::MaxRounds, rounds, warnings).await;
            }

            let available = self.lineup.available().await;
            if available.is_empty() {
                warn!(conversation_id = %handle.id(), round = state.round, "no agents available");
                return self
                    .conclude(handle, StopReason::NoAgentsAvailable, rounds, warnings)
                    .await;
            }

            let Some(speaker) = self.scheduler.select_next(&available, &state).await else {
                return self.conclude(handle, StopReason::OperatorStop, rounds, warnings).await;
            };

            let turn = match self.take_turn(&mut handle, &speaker, state.round).await {
                Ok(turn) => turn,
                Err(e) => return self.abort(handle, e.into(), rounds).await,
            };
            rounds = state.round;

            if let Some(reason) = self.scheduler.is_terminal(&turn, &state) {
                return self.conclude(handle, reason, rounds, warnings).await;
            }
            state.record(&speaker, spr);

            let trigger = self
                .compression
                .detect_signal(&turn)
                .or_else(|| self.compression.should_compress(handle.conversation()));
            if let Some(trigger) = trigger {
                let result = self
                    .compression
                    .compress(&self.store, handle, trigger, state.round)
                    .await;
                handle = match result {
                    Ok(CompressionResult::Reset {
                        handle: next,
                        previous,
                        summary_chars,
                    }) => {
                        record_reset(previous.id, &next, summary_chars, &self.events_tx).await;
                        next
                    }
                    Ok(CompressionResult::Skipped { handle, reason }) => {
                        record_skipped(handle.id(), reason, &self.events_tx).await;
                        handle
                    }
                    Err(failed) => return self.abort(failed.handle, failed.error.into(), rounds).await,
                };
            }

            if let Some(review) = self.review_turn(&turn).await {
                match review {
                    Review::Continue => {}
                    Review::Feedback(text) => {
                        let result = self
                            .scheduler
                            .inject_feedback(&mut handle, &text, turn.round)
                            .await;
                        match result {
                            Ok(feedback) => {
                                record_feedback(handle.id(), &feedback, &self.events_tx).await
                            }
                            Err(e) => return self.abort(handle, e.into(), rounds).await,
                        }
                    }
                    Review::Stop => {
                        return self
                            .conclude(handle, StopReason::OperatorStop, rounds, warnings)
                            .await;
                    }
                }
            }
        }
    }

    async fn review_turn(&self, turn: &Turn) -> Option<Review> {
        if !self.review {
            return None;
        }
        let operator = self.scheduler.operator()?;
        Some(operator.review_turn(turn).await)
    }

    /// Fill one slot: call the speaker and append its reply, or a
    /// diagnostic turn when the call failed for good.
    async fn take_turn(
        &self,
        handle: &mut ConversationHandle,
        speaker: &str,
        round: u32,
    ) -> Result<Turn, TranscriptError> {
        let conversation_id = handle.id();
        let Some(descriptor) = self.lineup.get(speaker) else {
            let draft = TurnDraft::agent(speaker, format!("[error] unknown agent '{speaker}'"), round);
            return handle.append(draft).await;
        };

        let opponent = self
            .scheduler
            .opponent_for(speaker, handle.conversation())
            .and_then(|id| self.lineup.get(&id))
            .map(AgentDescriptor::opponent_context);
        let request = AgentRequest::new(handle.conversation().topic.clone(), handle.history_snapshot())
            .with_opponent(opponent);
        let policy = match descriptor.timeout {
            Some(timeout) => self.retry.with_timeout(timeout),
            None => self.retry.clone(),
        };

        let (content, degraded) =
            match call_with_retry(descriptor.adapter().as_ref(), &request, &policy).await {
                CallOutcome::Success { text, .. } => (text, None),
                CallOutcome::Degraded { error, attempts } => {
                    warn!(
                        conversation_id = %conversation_id,
                        speaker = %descriptor.id,
                        attempts,
                        error = %error,
                        "turn degraded"
                    );
                    let content = format!(
                        "[error] {} could not respond after {attempts} attempt(s): {error}",
                        descriptor.id
                    );
                    (content, Some((attempts, error.to_string())))
                }
            };

        let draft = TurnDraft::agent(descriptor.id.clone(), content, round)
            .with_persona(descriptor.persona.clone(), descriptor.stance.clone());
        let turn = handle.append(draft).await?;

        record_turn(conversation_id, &turn, &self.events_tx).await;
        if let Some((attempts, error)) = degraded {
            record_degraded(conversation_id, &descriptor.id, attempts, error, &self.events_tx).await;
        }
        Ok(turn)
    }

    async fn conclude(
        &self,
        mut handle: ConversationHandle,
        reason: StopReason,
        rounds: u32,
        warnings: Vec<String>,
    ) -> Result<SessionOutcome, SessionError> {
        if let Err(e) = handle.terminate(reason, rounds).await {
            return self.abort(handle, e.into(), rounds).await;
        }
        finish(handle.id(), rounds, reason, &self.events_tx).await;

        Ok(SessionOutcome {
            conversation_id: handle.id(),
            rounds,
            reason,
            transcript: handle.path().to_path_buf(),
            warnings,
        })
    }

    /// Close the session after a fatal error. The footer is best effort.
    async fn abort(
        &self,
        mut handle: ConversationHandle,
        cause: SessionError,
        rounds: u32,
    ) -> Result<SessionOutcome, SessionError> {
        error!(conversation_id = %handle.id(), error = %cause, "session aborted");
        if handle.conversation().is_active() {
            if let Err(e) = handle.terminate(StopReason::FatalError, rounds).await {
                warn!(conversation_id = %handle.id(), error = %e, "could not record termination");
            }
        }
        finish(handle.id(), rounds, StopReason::FatalError, &self.events_tx).await;
        Err(cause)
    }
}
