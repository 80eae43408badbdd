//! Mock agent implementation for dry runs and testing.

use crate::agents::base::{Agent, AgentError, AgentRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// An agent that replays scripted responses.
///
/// Scripted results are consumed in order; once the script is exhausted the
/// fallback reply (if any) is returned forever.
pub struct MockAgent {
    available: bool,
    script: Mutex<VecDeque<Result<String, AgentError>>>,
    fallback: Option<Result<String, AgentError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockAgent {
    pub fn new(available: bool, script: Vec<Result<String, AgentError>>) -> Self {
        Self {
            available,
            script: Mutex::new(script.into()),
            fallback: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answer with `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::new(true, Vec::new()).then_reply(reply)
    }

    /// Play `replies` in order, then fail with an execution error.
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(true, replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn unavailable() -> Self {
        Self::new(false, Vec::new())
    }

    /// Fail every call with `error`.
    pub fn failing(error: AgentError) -> Self {
        let mut agent = Self::new(true, Vec::new());
        agent.fallback = Some(Err(error));
        agent
    }

    /// Reply used once the script runs out.
    pub fn then_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(Ok(reply.into()));
        self
    }

    /// Sleep before every response; used to exercise call timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `respond` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_result(&self) -> Result<String, AgentError> {
        let scripted = self.script.lock().ok().and_then(|mut script| script.pop_front());
        match (scripted, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(fallback)) => fallback.clone(),
            (None, None) => Err(AgentError::ExecutionError(
                "Mock agent script exhausted".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn check_availability(&self) -> bool {
        self.available
    }

    async fn respond(&self, _request: &AgentRequest) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.available {
            return Err(AgentError::NotAvailable("Mock agent not available".to_string()));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.next_result()
    }
}
