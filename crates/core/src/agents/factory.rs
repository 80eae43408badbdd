//! Agent factory for creating adapters from definitions.

use crate::agents::adapters::{CommandAdapter, HttpAdapter, MockAgent};
use crate::agents::base::{Agent, AgentError};
use dk_protocol::agent_models::{AgentDefinition, BackendKind};
use std::sync::Arc;

/// Factory for creating agent instances based on configuration.
///
/// The `backend` field of the definition selects the adapter:
/// - `http` → [`HttpAdapter`]
/// - `command` → [`CommandAdapter`]
/// - `mock` → [`MockAgent`] answering with `reply`
pub struct AgentFactory;

impl AgentFactory {
    /// Create an agent instance from a definition.
    ///
    /// # Examples
    ///
    /// ```
    /// use dk_core::agents::AgentFactory;
    /// use dk_protocol::agent_models::AgentDefinition;
    ///
    /// let definition = AgentDefinition::mock("writer", "Nothing to add.");
    /// let agent = AgentFactory::create(&definition).unwrap();
    /// ```
    pub fn create(definition: &AgentDefinition) -> Result<Arc<dyn Agent>, AgentError> {
        match definition.backend {
            BackendKind::Http => Ok(Arc::new(HttpAdapter::from_definition(definition)?)),
            BackendKind::Command => Ok(Arc::new(CommandAdapter::from_definition(definition)?)),
            BackendKind::Mock => {
                let reply = definition
                    .reply
                    .clone()
                    .unwrap_or_else(|| format!("{} has nothing further to add.", definition.name));
                Ok(Arc::new(MockAgent::replying(reply)))
            }
        }
    }
}
