//! Agent abstraction and management.
//!
//! This module provides the `Agent` trait (Adapter Pattern), the concrete
//! adapters, the bounded retry wrapper and the `AgentRegistry` holding a
//! session's participants.

pub mod adapters;
pub mod base;
pub mod cli_executor;
pub mod factory;
pub mod prompt;
pub mod registry;
pub mod retry;

pub use adapters::MockAgent;
pub use base::{Agent, AgentError, AgentRequest, HistoryEntry, OpponentContext, RequestPurpose};
pub use factory::AgentFactory;
pub use registry::{AgentDescriptor, AgentRegistry, RegistryError};
pub use retry::{call_with_retry, CallOutcome, RetryPolicy};
