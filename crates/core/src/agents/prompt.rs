//! Request text construction.
//!
//! Adapters that talk to text-in/text-out backends turn an [`AgentRequest`]
//! into a single prompt here, injecting the agent's persona and stance.

use crate::agents::base::{AgentRequest, HistoryEntry, RequestPurpose};
use crate::compression::RESET_MARKER;
use dk_protocol::agent_models::AgentDefinition;
use dk_protocol::conversation_models::STOP_SENTINEL;
use serde::Serialize;

/// Persona data an adapter injects into every request it builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Persona {
    pub name: String,
    pub persona: String,
    pub stance: String,
    pub instructions: String,
}

impl From<&AgentDefinition> for Persona {
    fn from(definition: &AgentDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            persona: definition.persona.clone(),
            stance: definition.stance.clone(),
            instructions: definition.instructions.trim().to_string(),
        }
    }
}

/// One `Speaker: content` line per entry, or `No dialogue yet.`.
pub fn format_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return "No dialogue yet.".to_string();
    }
    history
        .iter()
        .map(|entry| format!("{}: {}", entry.speaker, entry.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn introduction(persona: &Persona) -> String {
    let mut intro = format!("You are {}", persona.name);
    if !persona.persona.is_empty() {
        intro.push_str(&format!(", {}", persona.persona));
    }
    intro.push('.');
    if !persona.stance.is_empty() {
        intro.push_str(&format!(" Your role is to {}.", persona.stance));
    }
    intro
}

pub fn render_prompt(persona: &Persona, request: &AgentRequest) -> String {
    let mut sections = vec![introduction(persona)];

    if !persona.instructions.is_empty() {
        sections.push(persona.instructions.clone());
    }

    sections.push(format!("Topic: {}", request.topic));

    match request.purpose {
        RequestPurpose::Turn => {
            if let Some(opponent) = &request.opponent {
                let mut line = format!("You are responding to {}", opponent.name);
                if !opponent.persona.is_empty() {
                    line.push_str(&format!(", {}", opponent.persona));
                }
                if !opponent.stance.is_empty() {
                    line.push_str(&format!(", whose role is to {}", opponent.stance));
                }
                line.push('.');
                sections.push(line);
            }
            sections.push(format!(
                "Debate transcript:\n{}",
                format_history(&request.history)
            ));
            sections.push(format!(
                "Give your next contribution. If the debate has reached its conclusion, reply with exactly {STOP_SENTINEL} and nothing else."
            ));
        }
        RequestPurpose::Summarize => {
            sections.push(format!(
                "Conversation so far:\n{}",
                format_history(&request.history)
            ));
            sections.push(format!(
                "Condense the conversation above into a summary that keeps every open question, agreed point and position. Begin your reply with {RESET_MARKER} followed by the summary."
            ));
        }
    }

    sections.join("\n\n")
}
