//! The aggregated `.debate-kit/` configuration.

use crate::config::error::{ConfigError, ConfigResult};
use crate::transcript::USER_SPEAKER;
use dk_protocol::agent_models::{AgentDefinition, BackendKind};
use dk_protocol::config_models::SessionSettings;
use dk_protocol::roster_models::Roster;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Everything loaded from `.debate-kit/`.
///
/// ```rust,no_run
/// use dk_core::config::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("{} agents, {} rosters", config.agents.len(), config.rosters.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// From `config.toml`.
    pub settings: SessionSettings,

    /// From `agents/*.md`, in file name order.
    pub agents: Vec<AgentDefinition>,

    /// From `rosters/*.yaml`, in file name order.
    pub rosters: Vec<Roster>,
}

impl AppConfig {
    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn roster(&self, name: &str) -> Option<&Roster> {
        self.rosters.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Where transcripts go; relative paths resolve against `root`.
    pub fn transcript_dir(&self, root: &Path) -> PathBuf {
        if self.settings.transcript_dir.is_absolute() {
            self.settings.transcript_dir.clone()
        } else {
            root.join(&self.settings.transcript_dir)
        }
    }

    fn require_agent(&self, name: &str, context: &str) -> ConfigResult<()> {
        if self.agent(name).is_some() {
            Ok(())
        } else {
            Err(ConfigError::Inconsistent(format!(
                "{context} refers to unknown agent '{name}'"
            )))
        }
    }

    /// Check the settings, agents and rosters against each other.
    pub fn validate(&self) -> ConfigResult<()> {
        let settings = &self.settings;
        if settings.max_rounds == 0 {
            return Err(invalid_setting("max_rounds must be at least 1"));
        }
        if settings.speakers_per_round == 0 {
            return Err(invalid_setting("speakers_per_round must be at least 1"));
        }
        if settings.timeout_secs == 0 {
            return Err(invalid_setting("timeout_secs must be at least 1"));
        }
        if settings.compression_threshold == Some(0) {
            return Err(invalid_setting("compression_threshold must be at least 1"));
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            validate_agent(agent)?;
            if !names.insert(agent.name.to_ascii_lowercase()) {
                return Err(ConfigError::Inconsistent(format!(
                    "agent '{}' is defined more than once",
                    agent.name
                )));
            }
        }

        if let Some(first) = &settings.first_speaker {
            self.require_agent(first, "first_speaker")?;
        }
        if let Some(summarizer) = &settings.summarizer {
            self.require_agent(summarizer, "summarizer")?;
        }
        if settings.compression_threshold.is_some() && settings.summarizer.is_none() {
            return Err(ConfigError::Inconsistent(
                "compression_threshold is set but no summarizer is configured".to_string(),
            ));
        }

        let mut roster_names = HashSet::new();
        for roster in &self.rosters {
            let context = format!("roster '{}'", roster.name);
            if !roster_names.insert(roster.name.to_ascii_lowercase()) {
                return Err(ConfigError::Inconsistent(format!(
                    "{context} is defined more than once"
                )));
            }
            if roster.agents.is_empty() {
                return Err(ConfigError::Inconsistent(format!("{context} has no agents")));
            }
            if roster.max_rounds == Some(0) {
                return Err(ConfigError::Inconsistent(format!(
                    "{context}: max-rounds must be at least 1"
                )));
            }
            for name in &roster.agents {
                self.require_agent(name, &context)?;
            }
            if let Some(first) = &roster.first_speaker {
                if !roster.agents.iter().any(|a| a.eq_ignore_ascii_case(first)) {
                    return Err(ConfigError::Inconsistent(format!(
                        "{context}: first-speaker '{first}' is not part of the roster"
                    )));
                }
            }
            if let Some(summarizer) = &roster.summarizer {
                self.require_agent(summarizer, &context)?;
            }
        }

        Ok(())
    }
}

fn invalid_setting(reason: &str) -> ConfigError {
    ConfigError::InvalidConfig {
        path: PathBuf::from("config.toml"),
        reason: reason.to_string(),
    }
}

fn validate_agent(agent: &AgentDefinition) -> ConfigResult<()> {
    let invalid = |reason: String| ConfigError::InvalidConfig {
        path: PathBuf::from(format!("agents/{}.md", agent.name)),
        reason,
    };

    let name = agent.name.trim();
    if name.is_empty() {
        return Err(invalid("agent name must not be empty".to_string()));
    }
    if name != agent.name || agent.name.contains(['\n', '\r']) {
        return Err(invalid(format!(
            "agent name '{}' must not contain line breaks or surrounding spaces",
            agent.name.escape_debug()
        )));
    }
    if name.eq_ignore_ascii_case(USER_SPEAKER) {
        return Err(invalid(format!("'{USER_SPEAKER}' is reserved for operator feedback")));
    }
    if agent.timeout_secs == Some(0) {
        return Err(invalid("timeout_secs must be at least 1".to_string()));
    }

    match agent.backend {
        BackendKind::Http if agent.endpoint.is_none() => {
            Err(invalid("http backend requires an endpoint".to_string()))
        }
        BackendKind::Command if agent.command.is_none() => {
            Err(invalid("command backend requires a command".to_string()))
        }
        _ => Ok(()),
    }
}
