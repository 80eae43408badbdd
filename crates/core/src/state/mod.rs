//! Session state.
//!
//! - [`conversation`]: event notifications for conversation lifecycle changes
//! - [`manager`]: concurrent sessions on top of the debate engine

pub mod conversation;
pub mod manager;

pub use manager::{SessionManager, SessionResult, SessionSpec};
