//! Session orchestration and transfer logic for magnet-relay.
//!
//! This crate defines the ports (`SwarmEngine`, `ChatTransport`) that the
//! infrastructure layer implements, plus everything that drives a fetch from
//! a chat conversation: the fetch engine, the session store, the
//! conversational state machine, the orchestrator, and the delivery stage.
//! It never depends on `relay-infra` or any network crate.

pub mod delivery;
pub mod dispatch;
pub mod fetch;
pub mod session;
pub mod swarm;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
