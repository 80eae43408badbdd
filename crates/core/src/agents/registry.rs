//! Agent registry for the participants of a session.
//!
//! The `AgentRegistry` is responsible for:
//! - Keeping agents in roster order (rotation walks this order)
//! - Enforcing unique, case-insensitive ids
//! - Looking agents up by id, display name or 1-based position
//! - Evaluating availability predicates

use crate::agents::base::{Agent, AgentError, OpponentContext};
use crate::agents::factory::AgentFactory;
use dk_protocol::agent_models::AgentDefinition;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Duplicate agent id '{0}'")]
    Duplicate(String),

    #[error("Unknown agent '{0}'")]
    Unknown(String),

    #[error("Failed to build adapter for agent '{name}': {source}")]
    Adapter {
        name: String,
        #[source]
        source: AgentError,
    },
}

/// A participant: metadata plus the adapter that answers for it.
#[derive(Clone)]
pub struct AgentDescriptor {
    pub id: String,
    pub display_name: String,
    pub persona: String,
    pub stance: String,
    pub color: String,
    pub enabled: bool,
    /// Overrides the session-wide call timeout.
    pub timeout: Option<Duration>,
    adapter: Arc<dyn Agent>,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, adapter: Arc<dyn Agent>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            persona: String::new(),
            stance: String::new(),
            color: String::new(),
            enabled: true,
            timeout: None,
            adapter,
        }
    }

    pub fn from_definition(definition: &AgentDefinition, adapter: Arc<dyn Agent>) -> Self {
        Self {
            persona: definition.persona.clone(),
            stance: definition.stance.clone(),
            color: definition.color.clone(),
            enabled: definition.enabled,
            timeout: definition.timeout_secs.map(Duration::from_secs),
            ..Self::new(definition.name.clone(), adapter)
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>, stance: impl Into<String>) -> Self {
        self.persona = persona.into();
        self.stance = stance.into();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn adapter(&self) -> Arc<dyn Agent> {
        self.adapter.clone()
    }

    /// Enabled and reachable right now.
    pub async fn is_available(&self) -> bool {
        self.enabled && self.adapter.check_availability().await
    }

    pub fn opponent_context(&self) -> OpponentContext {
        OpponentContext {
            name: self.id.clone(),
            persona: self.persona.clone(),
            stance: self.stance.clone(),
        }
    }

    fn answers_to(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key) || self.display_name.eq_ignore_ascii_case(key)
    }
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("persona", &self.persona)
            .field("stance", &self.stance)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// An ordered roster of agents. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentDescriptor>) -> Result<Self, RegistryError> {
        for (i, agent) in agents.iter().enumerate() {
            if agents[..i].iter().any(|other| other.id.eq_ignore_ascii_case(&agent.id)) {
                return Err(RegistryError::Duplicate(agent.id.clone()));
            }
        }
        Ok(Self { agents })
    }

    /// Build adapters for every definition via [`AgentFactory`].
    pub fn from_definitions(definitions: &[AgentDefinition]) -> Result<Self, RegistryError> {
        let agents = definitions
            .iter()
            .map(|definition| {
                AgentFactory::create(definition)
                    .map(|adapter| AgentDescriptor::from_definition(definition, adapter))
                    .map_err(|source| RegistryError::Adapter {
                        name: definition.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(agents)
    }

    /// Look up by id or display name, ignoring case.
    pub fn get(&self, key: &str) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|agent| agent.answers_to(key))
    }

    /// Look up by 1-based roster position.
    pub fn by_position(&self, position: usize) -> Option<&AgentDescriptor> {
        position.checked_sub(1).and_then(|i| self.agents.get(i))
    }

    /// Accept either a 1-based number or an id/display name.
    pub fn resolve(&self, key: &str) -> Option<&AgentDescriptor> {
        let key = key.trim();
        match key.parse::<usize>() {
            Ok(position) => self.by_position(position),
            Err(_) => self.get(key),
        }
    }

    /// Roster position of `id` (0-based).
    pub fn position(&self, id: &str) -> Option<usize> {
        self.agents.iter().position(|agent| agent.answers_to(id))
    }

    /// A registry holding only `names`, in the given order.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, RegistryError> {
        let agents = names
            .iter()
            .map(|name| {
                self.get(name.as_ref())
                    .cloned()
                    .ok_or_else(|| RegistryError::Unknown(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(agents)
    }

    /// Ids of agents whose availability predicate holds, in roster order.
    pub async fn available(&self) -> Vec<String> {
        let mut available = Vec::new();
        for agent in &self.agents {
            if agent.is_available().await {
                available.push(agent.id.clone());
            }
        }
        available
    }

    pub fn ids(&self) -> Vec<String> {
        self.agents.iter().map(|agent| agent.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn has_agent(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}
