//! Observability setup for magnet-relay: console and file logging through
//! `tracing`, with optional OpenTelemetry span export.

pub mod tracing_setup;

pub use tracing_setup::{TracingGuard, TracingOptions, init_tracing, shutdown_tracing};
