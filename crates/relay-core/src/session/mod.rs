//! Conversation sessions: the state machine, the store, and the
//! orchestrator that ties them to the fetch engine and the transport.

pub mod grammar;
pub mod machine;
pub mod orchestrator;
pub mod replies;
pub mod store;

pub use machine::{Command, Effect, Input, Transition, transition};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use store::{Session, SessionStore, SessionSummary, SharedSession};
