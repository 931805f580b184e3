//! Shared domain types for magnet-relay.
//!
//! This crate contains the types passed between the orchestration core and
//! its adapters: fetchable files, progress snapshots, swarm statistics,
//! conversation identities and states, configuration, and error enums.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod fetch;
