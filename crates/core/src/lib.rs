//! # dk-core
//!
//! Debate orchestration engine for debate-kit.
//!
//! This crate provides:
//! - The agent adapter contract, adapters, registry and retry wrapper
//! - Durable plain-text transcripts
//! - Turn scheduling, compression and reset
//! - The debate engine and concurrent session manager
//! - Configuration loading from `.debate-kit/` and `init` scaffolding
//!
//! ## Modules
//!
//! - [`agents`]: Agent trait, adapters and registry
//! - [`transcript`]: Transcript format and storage
//! - [`scheduler`]: Speaker selection, feedback and termination
//! - [`compression`]: Summarize-and-reset
//! - [`engine`]: The debate loop
//! - [`state`]: Lifecycle events and concurrent sessions
//! - [`config`]: Configuration loading and validation
//! - [`init`]: `.debate-kit/` scaffolding

pub mod agents;
pub mod compression;
pub mod config;
pub mod engine;
pub mod init;
pub mod scheduler;
pub mod state;
pub mod transcript;
