//! Named rosters from `.debate-kit/rosters/*.yaml`.

use serde::{Deserialize, Serialize};

/// A named lineup of agents for a session.
///
/// Optional fields override the matching session settings when the roster
/// is selected.
///
/// # Example
///
/// ```yaml
/// name: architecture-review
/// agents:
///   - proponent
///   - challenger
///   - writer
/// first-speaker: proponent
/// max-rounds: 6
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Roster {
    pub name: String,

    /// Agent names, in rotation order.
    pub agents: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_speaker: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarizer: Option<String>,
}
