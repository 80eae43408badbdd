//! Adapter for OpenAI-compatible chat-completions endpoints.

use crate::agents::base::{Agent, AgentError, AgentRequest};
use crate::agents::prompt::{render_prompt, Persona};
use async_trait::async_trait;
use dk_protocol::agent_models::AgentDefinition;
use std::time::Duration;
use tracing::debug;

/// Longest slice of an error body carried into an `AgentError`.
const MAX_ERROR_BODY: usize = 500;

pub struct HttpAdapter {
    persona: Persona,
    endpoint: String,
    model: String,
    api_key_env: Option<String>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(
        persona: Persona,
        endpoint: String,
        model: String,
        api_key_env: Option<String>,
    ) -> Result<Self, AgentError> {
        // call deadlines come from the retry wrapper
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::ExecutionError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            persona,
            endpoint,
            model,
            api_key_env,
            temperature: None,
            client,
        })
    }

    pub fn from_definition(definition: &AgentDefinition) -> Result<Self, AgentError> {
        let endpoint = definition.endpoint.clone().ok_or_else(|| {
            AgentError::NotAvailable(format!(
                "Agent '{}' uses the http backend but has no endpoint",
                definition.name
            ))
        })?;

        let mut adapter = Self::new(
            Persona::from(definition),
            endpoint,
            definition.model.clone(),
            definition.api_key_env.clone(),
        )?;
        adapter.temperature = definition.temperature;
        Ok(adapter)
    }

    fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_ref()?;
        std::env::var(var).ok().filter(|key| !key.trim().is_empty())
    }

    fn body(&self, request: &AgentRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": render_prompt(&self.persona, request) }
            ],
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }
}

/// Map an unsuccessful HTTP status to the error taxonomy.
pub(crate) fn classify_status(status: u16, body: &str) -> AgentError {
    let message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    match status {
        429 => AgentError::RateLimited(message),
        401 | 403 => AgentError::Auth(format!("HTTP {status}: {message}")),
        408 | 425 | 500..=599 => AgentError::Transport(format!("HTTP {status}: {message}")),
        _ => AgentError::Api { status, message },
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
pub(crate) fn extract_content(response: &serde_json::Value) -> Result<String, AgentError> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            AgentError::StreamParseError(
                "Response has no choices[0].message.content".to_string(),
            )
        })
}

#[async_trait]
impl Agent for HttpAdapter {
    async fn check_availability(&self) -> bool {
        match &self.api_key_env {
            Some(_) => self.api_key().is_some(),
            None => true,
        }
    }

    async fn respond(&self, request: &AgentRequest) -> Result<String, AgentError> {
        let mut call = self.client.post(&self.endpoint).json(&self.body(request));

        if let Some(var) = &self.api_key_env {
            let key = self.api_key().ok_or_else(|| {
                AgentError::NotAvailable(format!("Environment variable {var} is not set"))
            })?;
            call = call.bearer_auth(key);
        }

        debug!(endpoint = %self.endpoint, model = %self.model, "sending chat completion request");

        let response = call
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::StreamParseError(e.to_string()))?;

        extract_content(&json)
    }
}
