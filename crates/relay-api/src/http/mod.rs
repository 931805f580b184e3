//! Status HTTP API.
//!
//! Read-only view of the running relay at `/api/v1/`, using the envelope
//! response format, plus an unauthenticated `/health` probe.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
