//! # dk-protocol
//!
//! Core protocol definitions and data models for debate-kit.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (TOML settings, Markdown agents, YAML rosters)
//! - Conversations, turns and their lifecycle
//! - Events reported by the debate engine
//!
//! ## Modules
//!
//! - [`agent_models`]: Agent definitions
//! - [`config_models`]: Session settings from config.toml
//! - [`roster_models`]: Named agent lineups
//! - [`conversation_models`]: Turns, conversations and stop reasons
//! - [`ipc`]: Engine events
//!
//! This crate has no dependencies on other debate-kit crates.

pub mod agent_models;
pub mod config_models;
pub mod conversation_models;
pub mod ipc;
pub mod roster_models;

// Re-export all public types for convenience
pub use agent_models::*;
pub use config_models::*;
pub use conversation_models::*;
pub use ipc::*;
pub use roster_models::*;
