//! Compression and reset.
//!
//! When a conversation grows past the configured threshold, or the
//! designated summarizer asks for it, the history is condensed into a
//! summary that seeds a new conversation. The old conversation is closed
//! with a footer pointing at its successor and is never modified again.
//!
//! ```text
//! Active ──trigger──▶ Compressing ──ok──▶ Active(new)
//!                         │
//!                         └──failure──▶ Active(old)
//! ```

use crate::agents::base::AgentRequest;
use crate::agents::registry::AgentDescriptor;
use crate::agents::retry::{call_with_retry, CallOutcome, RetryPolicy};
use crate::transcript::{ConversationHandle, TranscriptError, TranscriptStore, TurnDraft};
use dk_protocol::conversation_models::{Conversation, Turn, TurnOrigin, STOP_SENTINEL};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

/// Marker a summarizer uses to request a reset.
pub const RESET_MARKER: &str = "RESET_CONVERSATION";

fn find_marker(text: &str) -> Option<usize> {
    text.to_ascii_uppercase().find(RESET_MARKER)
}

/// The summary carried by an explicit reset request, if any.
///
/// The marker is matched case-insensitively anywhere in the text; the
/// summary is the trimmed text after it and must not be empty.
pub fn signal_summary(content: &str) -> Option<String> {
    let at = find_marker(content)?;
    let summary = content[at + RESET_MARKER.len()..]
        .trim_start_matches(':')
        .trim();
    if summary.is_empty() {
        None
    } else {
        Some(summary.to_string())
    }
}

/// Drop a leading reset marker from a summary.
pub fn strip_marker(text: &str) -> String {
    let trimmed = text.trim();
    match find_marker(trimmed) {
        Some(0) => trimmed[RESET_MARKER.len()..]
            .trim_start_matches([':', ' ', '\n', '\r', '\t'])
            .trim()
            .to_string(),
        _ => trimmed.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionPolicy {
    /// Characters of content added since the last reset that trigger another.
    pub threshold: Option<usize>,
    /// Agent id of the summarizer.
    pub summarizer: Option<String>,
}

/// Why a reset is about to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Threshold { size: usize },
    /// The summarizer asked for a reset and already supplied the summary.
    Signal { summary: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    Active,
    Compressing,
}

/// Outcome of a compression attempt that did not hit a storage error.
#[derive(Debug)]
pub enum CompressionResult {
    Reset {
        handle: ConversationHandle,
        previous: Conversation,
        summary_chars: usize,
    },
    /// The summary could not be produced; the conversation is untouched.
    Skipped {
        handle: ConversationHandle,
        reason: String,
    },
}

/// A storage failure during a reset. Carries whichever handle is still
/// writable so the caller can close the session.
#[derive(Debug)]
pub struct ResetFailed {
    pub error: TranscriptError,
    pub handle: ConversationHandle,
}

impl fmt::Display for ResetFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reset failed: {}", self.error)
    }
}

impl std::error::Error for ResetFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct CompressionManager {
    policy: CompressionPolicy,
    summarizer: Option<AgentDescriptor>,
    retry: RetryPolicy,
    state: ResetState,
}

impl CompressionManager {
    /// `summarizer` is the descriptor named by the policy, when it exists.
    pub fn new(
        policy: CompressionPolicy,
        summarizer: Option<AgentDescriptor>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            policy,
            summarizer,
            retry,
            state: ResetState::Active,
        }
    }

    pub fn disabled() -> Self {
        Self::new(CompressionPolicy::default(), None, RetryPolicy::default())
    }

    pub fn state(&self) -> ResetState {
        self.state
    }

    pub fn policy(&self) -> &CompressionPolicy {
        &self.policy
    }

    /// Threshold trigger.
    ///
    /// The seed summary is not counted, so a summary longer than the
    /// threshold cannot force a reset after every turn.
    pub fn should_compress(&self, conversation: &Conversation) -> Option<Trigger> {
        let threshold = self.policy.threshold?;
        let mut new_turns = conversation
            .turns
            .iter()
            .filter(|t| t.origin != TurnOrigin::Compression)
            .peekable();
        new_turns.peek()?;
        let size: usize = new_turns.map(|t| t.content.chars().count()).sum();

        (size >= threshold).then_some(Trigger::Threshold { size })
    }

    /// Explicit trigger: a summarizer turn carrying the reset marker.
    pub fn detect_signal(&self, turn: &Turn) -> Option<Trigger> {
        let summarizer = self.policy.summarizer.as_deref()?;
        if turn.origin != TurnOrigin::Agent || !turn.speaker.eq_ignore_ascii_case(summarizer) {
            return None;
        }
        signal_summary(&turn.content).map(|summary| Trigger::Signal { summary })
    }

    async fn summarize(&self, handle: &ConversationHandle) -> Result<String, String> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| "no summarizer configured".to_string())?;

        if !summarizer.is_available().await {
            return Err(format!("summarizer '{}' is not available", summarizer.id));
        }

        let request =
            AgentRequest::new(handle.conversation().topic.clone(), handle.history_snapshot())
                .for_summary();
        let policy = match summarizer.timeout {
            Some(timeout) => self.retry.with_timeout(timeout),
            None => self.retry.clone(),
        };

        match call_with_retry(summarizer.adapter().as_ref(), &request, &policy).await {
            CallOutcome::Success { text, .. } => {
                let summary = strip_marker(&text);
                if summary.is_empty() {
                    Err("summarizer returned an empty summary".to_string())
                } else if summary == STOP_SENTINEL {
                    Err("summarizer returned the stop sentinel".to_string())
                } else {
                    Ok(summary)
                }
            }
            CallOutcome::Degraded { error, attempts } => Err(format!(
                "summarizer failed after {attempts} attempt(s): {error}"
            )),
        }
    }

    /// Run one compression attempt.
    ///
    /// Owns `handle` for the duration, so no turn can be scheduled while
    /// the reset is in progress. `round` is recorded on the seed turn.
    pub async fn compress(
        &mut self,
        store: &TranscriptStore,
        handle: ConversationHandle,
        trigger: Trigger,
        round: u32,
    ) -> Result<CompressionResult, ResetFailed> {
        self.state = ResetState::Compressing;
        let old_id = handle.id();
        info!(conversation_id = %old_id, trigger = ?trigger, "compressing conversation");

        let summary = match trigger {
            Trigger::Signal { summary } => summary,
            Trigger::Threshold { .. } => match self.summarize(&handle).await {
                Ok(summary) => summary,
                Err(reason) => {
                    warn!(conversation_id = %old_id, reason = %reason, "compression skipped");
                    self.state = ResetState::Active;
                    return Ok(CompressionResult::Skipped { handle, reason });
                }
            },
        };

        let result = self.reset(store, handle, summary, round).await;
        self.state = ResetState::Active;
        result
    }

    /// Hand continuity to a new conversation seeded with `summary`.
    ///
    /// The new transcript is durable before the old one is closed.
    async fn reset(
        &self,
        store: &TranscriptStore,
        handle: ConversationHandle,
        summary: String,
        round: u32,
    ) -> Result<CompressionResult, ResetFailed> {
        let old_id = handle.id();
        let topic = handle.conversation().topic.clone();
        let speaker = self
            .policy
            .summarizer
            .clone()
            .unwrap_or_else(|| "compression".to_string());

        let mut next = match store.create(Uuid::new_v4(), &topic, Some(old_id)).await {
            Ok(next) => next,
            Err(error) => {
                return Err(ResetFailed {
                    error,
                    handle,
                })
            }
        };

        let mut seed = TurnDraft::compression(speaker, summary, round);
        if let Some(summarizer) = &self.summarizer {
            seed = seed.with_persona(summarizer.persona.clone(), summarizer.stance.clone());
        }
        let summary_chars = seed.content.chars().count();

        if let Err(error) = next.append(seed).await {
            return Err(ResetFailed {
                error,
                handle,
            });
        }

        let previous = match handle.mark_compressed(next.id()).await {
            Ok(previous) => previous,
            Err(error) => {
                return Err(ResetFailed {
                    error,
                    handle: next,
                })
            }
        };

        info!(
            old_conversation_id = %old_id,
            new_conversation_id = %next.id(),
            summary_chars,
            "conversation reset"
        );

        Ok(CompressionResult::Reset {
            handle: next,
            previous,
            summary_chars,
        })
    }
}
