//! Infrastructure layer for magnet-relay.
//!
//! Contains implementations of the port traits defined in `relay-core`:
//! the Telegram Bot API chat transport and the Transmission RPC swarm
//! engine, plus the configuration loader (config file and environment).

pub mod config;
pub mod telegram;
pub mod transmission;
