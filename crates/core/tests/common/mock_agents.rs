//! Mock agents and operators for deterministic testing.

use async_trait::async_trait;
use dk_core::agents::{Agent, AgentDescriptor, AgentError, AgentRegistry, AgentRequest, MockAgent, RequestPurpose};
use dk_core::scheduler::{Operator, Review};
use dk_protocol::conversation_models::Turn;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Build a registry from `(id, agent)` pairs, in roster order.
#[allow(dead_code)]
pub fn registry(agents: Vec<(&str, Arc<dyn Agent>)>) -> AgentRegistry {
    let descriptors = agents
        .into_iter()
        .map(|(id, agent)| AgentDescriptor::new(id, agent))
        .collect();
    AgentRegistry::new(descriptors).unwrap()
}

/// Shorthand for an agent that always gives the same answer.
#[allow(dead_code)]
pub fn replying(reply: &str) -> Arc<dyn Agent> {
    Arc::new(MockAgent::replying(reply))
}

/// What an agent was asked, as seen by [`RecordingAgent`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub topic: String,
    pub speakers: Vec<String>,
    pub contents: Vec<String>,
    pub opponent: Option<String>,
    pub purpose: RequestPurpose,
}

/// A mock agent that replies with a fixed text and records every request.
#[allow(dead_code)]
pub struct RecordingAgent {
    reply: String,
    seen: Mutex<Vec<SeenRequest>>,
}

impl RecordingAgent {
    #[allow(dead_code)]
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for RecordingAgent {
    async fn check_availability(&self) -> bool {
        true
    }

    async fn respond(&self, request: &AgentRequest) -> Result<String, AgentError> {
        self.seen.lock().unwrap().push(SeenRequest {
            topic: request.topic.clone(),
            speakers: request.history.iter().map(|h| h.speaker.clone()).collect(),
            contents: request.history.iter().map(|h| h.content.clone()).collect(),
            opponent: request.opponent.as_ref().map(|o| o.name.clone()),
            purpose: request.purpose,
        });
        Ok(self.reply.clone())
    }
}

/// An operator that plays back scripted answers.
///
/// Speaker choices and reviews are consumed in order. An exhausted speaker
/// script stops the session; an exhausted review script continues it.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedOperator {
    speakers: Mutex<VecDeque<String>>,
    reviews: Mutex<VecDeque<Review>>,
    reviewed: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    #[allow(dead_code)]
    pub fn choosing(speakers: &[&str]) -> Self {
        Self {
            speakers: Mutex::new(speakers.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    #[allow(dead_code)]
    pub fn reviewing(reviews: Vec<Review>) -> Self {
        Self {
            reviews: Mutex::new(reviews.into()),
            ..Self::default()
        }
    }

    /// Speakers of the turns shown for review, in order.
    #[allow(dead_code)]
    pub fn reviewed(&self) -> Vec<String> {
        self.reviewed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn choose_speaker(&self, _candidates: &[String]) -> Option<String> {
        self.speakers.lock().unwrap().pop_front()
    }

    async fn review_turn(&self, turn: &Turn) -> Review {
        self.reviewed.lock().unwrap().push(turn.speaker.clone());
        self.reviews
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Review::Continue)
    }
}
