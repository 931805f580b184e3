//! Transmission daemon adapter.

pub mod client;
pub mod types;

pub use client::TransmissionSwarm;
