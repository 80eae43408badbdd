//! Turn scheduling.
//!
//! The scheduler decides who speaks next, records operator feedback and
//! decides when a session is over. It never calls adapters itself.

use crate::transcript::{ConversationHandle, TranscriptError, TurnDraft};
use async_trait::async_trait;
use dk_protocol::config_models::SelectionMode;
use dk_protocol::conversation_models::{Conversation, StopReason, Turn, TurnOrigin};
use std::sync::Arc;
use tracing::debug;

/// Position of the next slot to fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundState {
    /// 1-based round number.
    pub round: u32,
    /// 0-based slot within the round.
    pub slot: u32,
    pub last_speaker: Option<String>,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            round: 1,
            slot: 0,
            last_speaker: None,
        }
    }
}

impl RoundState {
    /// Rebuild the position from recorded turns; used on resume.
    ///
    /// Only agent turns fill slots. The round counter carries across
    /// resets because the compression seed records the round it was made in.
    pub fn from_conversation(conversation: &Conversation, speakers_per_round: u32) -> Self {
        let last_agent = conversation
            .turns
            .iter()
            .rev()
            .find(|t| t.origin == TurnOrigin::Agent);

        let Some(last) = last_agent else {
            let round = conversation
                .turns
                .iter()
                .map(|t| t.round)
                .max()
                .unwrap_or(1)
                .max(1);
            return Self {
                round,
                ..Self::default()
            };
        };

        let filled = conversation
            .turns
            .iter()
            .filter(|t| t.origin == TurnOrigin::Agent && t.round == last.round)
            .count() as u32;

        let mut state = Self {
            round: last.round,
            slot: filled.saturating_sub(1),
            last_speaker: Some(last.speaker.clone()),
        };
        state.advance(speakers_per_round);
        state
    }

    /// True once the slot just filled was the last of its round.
    pub fn round_complete(&self, speakers_per_round: u32) -> bool {
        self.slot + 1 >= speakers_per_round
    }

    /// Move past the slot just filled.
    pub fn advance(&mut self, speakers_per_round: u32) {
        if self.round_complete(speakers_per_round) {
            self.round += 1;
            self.slot = 0;
        } else {
            self.slot += 1;
        }
    }

    pub fn record(&mut self, speaker: &str, speakers_per_round: u32) {
        self.last_speaker = Some(speaker.to_string());
        self.advance(speakers_per_round);
    }
}

/// The operator's verdict after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Review {
    Continue,
    Feedback(String),
    Stop,
}

/// An interactive human steering the session.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Pick the next speaker from the numbered `candidates`.
    ///
    /// The answer may be a 1-based number or an agent id; `None` ends the
    /// session.
    async fn choose_speaker(&self, candidates: &[String]) -> Option<String>;

    async fn review_turn(&self, turn: &Turn) -> Review;
}

#[derive(Clone)]
pub struct Scheduler {
    roster: Vec<String>,
    selection: SelectionMode,
    first_speaker: Option<String>,
    speakers_per_round: u32,
    max_rounds: u32,
    operator: Option<Arc<dyn Operator>>,
}

impl Scheduler {
    /// `roster` is the rotation order.
    pub fn new(roster: Vec<String>, max_rounds: u32) -> Self {
        Self {
            roster,
            selection: SelectionMode::Rotation,
            first_speaker: None,
            speakers_per_round: 1,
            max_rounds: max_rounds.max(1),
            operator: None,
        }
    }

    pub fn with_selection(mut self, selection: SelectionMode) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_first_speaker(mut self, first_speaker: Option<String>) -> Self {
        self.first_speaker = first_speaker;
        self
    }

    pub fn with_speakers_per_round(mut self, speakers_per_round: u32) -> Self {
        self.speakers_per_round = speakers_per_round.max(1);
        self
    }

    pub fn with_operator(mut self, operator: Option<Arc<dyn Operator>>) -> Self {
        self.operator = operator;
        self
    }

    pub fn speakers_per_round(&self) -> u32 {
        self.speakers_per_round
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn operator(&self) -> Option<&Arc<dyn Operator>> {
        self.operator.as_ref()
    }

    /// Choose the next speaker among `available` (ids, roster order).
    ///
    /// Returns `None` only when the operator declines to choose.
    pub async fn select_next(&self, available: &[String], state: &RoundState) -> Option<String> {
        if available.is_empty() {
            return None;
        }

        if self.selection == SelectionMode::Manual {
            if let Some(operator) = &self.operator {
                return choose_manually(operator.as_ref(), available).await;
            }
        }

        Some(self.rotate(available, state))
    }

    fn rotate(&self, available: &[String], state: &RoundState) -> String {
        let is_opening = state.round == 1 && state.slot == 0 && state.last_speaker.is_none();
        if is_opening {
            if let Some(pinned) = self
                .first_speaker
                .as_deref()
                .and_then(|pinned| find(available, pinned))
            {
                return pinned.clone();
            }
        }

        let after = state
            .last_speaker
            .as_deref()
            .and_then(|last| self.roster.iter().position(|id| id.eq_ignore_ascii_case(last)));

        if let Some(last) = after {
            for offset in 1..=self.roster.len() {
                let candidate = &self.roster[(last + offset) % self.roster.len()];
                if let Some(found) = find(available, candidate) {
                    return found.clone();
                }
            }
        }

        available[0].clone()
    }

    /// Whether the session ends after `turn`, recorded at `state`.
    ///
    /// `state` must still point at the slot the turn filled. The round
    /// limit only applies once the round's last slot is filled.
    pub fn is_terminal(&self, turn: &Turn, state: &RoundState) -> Option<StopReason> {
        if turn.is_sentinel() {
            return Some(StopReason::Sentinel);
        }
        if state.round >= self.max_rounds && state.round_complete(self.speakers_per_round) {
            return Some(StopReason::MaxRounds);
        }
        None
    }

    /// Record operator feedback as a user turn. No adapter is called.
    pub async fn inject_feedback(
        &self,
        handle: &mut ConversationHandle,
        text: &str,
        round: u32,
    ) -> Result<Turn, TranscriptError> {
        debug!(conversation_id = %handle.id(), round, "injecting operator feedback");
        handle.append(TurnDraft::user(text, round)).await
    }

    /// The agent `speaker` argues against: the most recent other agent in
    /// the history, else the first other agent of the roster.
    pub fn opponent_for(&self, speaker: &str, conversation: &Conversation) -> Option<String> {
        conversation
            .turns
            .iter()
            .rev()
            .filter(|t| t.origin == TurnOrigin::Agent)
            .map(|t| t.speaker.as_str())
            .find(|s| !s.eq_ignore_ascii_case(speaker) && self.is_rostered(s))
            .or_else(|| {
                self.roster
                    .iter()
                    .map(String::as_str)
                    .find(|id| !id.eq_ignore_ascii_case(speaker))
            })
            .map(str::to_string)
    }

    fn is_rostered(&self, id: &str) -> bool {
        self.roster.iter().any(|r| r.eq_ignore_ascii_case(id))
    }
}

fn find<'a>(available: &'a [String], id: &str) -> Option<&'a String> {
    available.iter().find(|a| a.eq_ignore_ascii_case(id))
}

async fn choose_manually(operator: &dyn Operator, candidates: &[String]) -> Option<String> {
    loop {
        let answer = operator.choose_speaker(candidates).await?;
        let answer = answer.trim();

        let chosen = match answer.parse::<usize>() {
            Ok(n) => n.checked_sub(1).and_then(|i| candidates.get(i)),
            Err(_) => find(candidates, answer),
        };

        match chosen {
            Some(id) => return Some(id.clone()),
            None => debug!(answer, "operator picked an unknown speaker, asking again"),
        }
    }
}
