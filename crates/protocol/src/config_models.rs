//! Session settings from `.debate-kit/config.toml`.
//!
//! Every field has a default, so an empty (or missing) file yields a
//! usable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the scheduler chooses the next speaker.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Walk the roster in order, wrapping around.
    #[default]
    Rotation,
    /// Ask the operator for every slot.
    Manual,
}

/// Settings that govern one debate session.
///
/// # Example
///
/// ```toml
/// # .debate-kit/config.toml
/// max_rounds = 12
/// speakers_per_round = 1
/// retry_count = 3
/// timeout_secs = 120
/// compression_threshold = 40000
/// summarizer = "compression"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Hard limit on rounds per session (counted across resets).
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Turns scheduled per round.
    #[serde(default = "default_speakers_per_round")]
    pub speakers_per_round: u32,

    #[serde(default)]
    pub selection: SelectionMode,

    /// Agent pinned to the first slot of round 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_speaker: Option<String>,

    /// Characters of history that trigger a compression reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_threshold: Option<usize>,

    /// Agent that writes compression summaries and may request resets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarizer: Option<String>,

    /// Extra attempts after the first failed adapter call.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Default adapter call timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Initial retry backoff, doubled on every further attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Where transcripts are written, relative to the project root.
    #[serde(default = "default_transcript_dir")]
    pub transcript_dir: PathBuf,
}

fn default_max_rounds() -> u32 {
    10
}

fn default_speakers_per_round() -> u32 {
    1
}

fn default_retry_count() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_transcript_dir() -> PathBuf {
    PathBuf::from("transcripts")
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            speakers_per_round: default_speakers_per_round(),
            selection: SelectionMode::default(),
            first_speaker: None,
            compression_threshold: None,
            summarizer: None,
            retry_count: default_retry_count(),
            timeout_secs: default_timeout_secs(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            transcript_dir: default_transcript_dir(),
        }
    }
}
