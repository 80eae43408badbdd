//! Bounded retry around a single adapter call.
//!
//! Every attempt is capped by a timeout. Transient failures are retried
//! with exponential backoff; anything else, or the last failed attempt,
//! yields a degraded outcome instead of an error so the caller can fill
//! the slot and move on.

use crate::agents::base::{Agent, AgentError, AgentRequest};
use dk_protocol::config_models::SessionSettings;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retry_count: u32,
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            retry_count: settings.retry_count,
            timeout: Duration::from_secs(settings.timeout_secs),
            initial_backoff: Duration::from_millis(settings.backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    /// Same policy with a different per-attempt timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

/// Result of [`call_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success { text: String, attempts: u32 },
    Degraded { error: AgentError, attempts: u32 },
}

impl CallOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Degraded { attempts, .. } => *attempts,
        }
    }
}

/// Call `agent` until it answers, a non-transient error occurs, or the
/// retries run out.
pub async fn call_with_retry(
    agent: &dyn Agent,
    request: &AgentRequest,
    policy: &RetryPolicy,
) -> CallOutcome {
    let max_attempts = policy.retry_count.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match tokio::time::timeout(policy.timeout, agent.respond(request)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(policy.timeout)),
        };

        let error = match result {
            Ok(text) => {
                debug!(attempt, "adapter call succeeded");
                return CallOutcome::Success {
                    text,
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };

        if !error.is_transient() || attempt >= max_attempts {
            warn!(attempt, error = %error, "adapter call failed, giving up");
            return CallOutcome::Degraded {
                error,
                attempts: attempt,
            };
        }

        let backoff = policy.backoff_for(attempt);
        warn!(
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "transient adapter failure, retrying"
        );
        tokio::time::sleep(backoff).await;
    }
}
