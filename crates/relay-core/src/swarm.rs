//! SwarmEngine trait definition.
//!
//! The swarm engine is the BitTorrent backend that actually moves bytes.
//! The fetch engine drives it through this narrow interface; the Transmission
//! RPC adapter lives in relay-infra.

use std::collections::BTreeSet;
use std::path::Path;

use relay_types::error::SwarmError;
use relay_types::fetch::{ResourceHandle, SwarmFile, SwarmSessionHandle, SwarmStats};

/// Trait for swarm engine backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Every method
/// is a single round trip; polling and timeouts are the caller's concern.
pub trait SwarmEngine: Send + Sync {
    /// Create an isolated session whose downloads land under `download_dir`.
    fn create_session(
        &self,
        download_dir: &Path,
    ) -> impl std::future::Future<Output = Result<SwarmSessionHandle, SwarmError>> + Send;

    /// Register a magnet locator within a session.
    fn add_resource(
        &self,
        session: SwarmSessionHandle,
        locator: &str,
    ) -> impl std::future::Future<Output = Result<ResourceHandle, SwarmError>> + Send;

    /// Current status, byte counters, and peer count of a resource.
    fn stats(
        &self,
        resource: &ResourceHandle,
    ) -> impl std::future::Future<Output = Result<SwarmStats, SwarmError>> + Send;

    /// File layout of a resource. Only meaningful once metadata is resolved.
    fn files(
        &self,
        resource: &ResourceHandle,
    ) -> impl std::future::Future<Output = Result<Vec<SwarmFile>, SwarmError>> + Send;

    /// Mark exactly the files in `wanted` (0-based) for download; every
    /// other index in `0..file_count` is skipped.
    fn select_files(
        &self,
        resource: &ResourceHandle,
        wanted: &BTreeSet<usize>,
        file_count: usize,
    ) -> impl std::future::Future<Output = Result<(), SwarmError>> + Send;

    fn start(
        &self,
        resource: &ResourceHandle,
    ) -> impl std::future::Future<Output = Result<(), SwarmError>> + Send;

    fn stop(
        &self,
        resource: &ResourceHandle,
    ) -> impl std::future::Future<Output = Result<(), SwarmError>> + Send;

    /// Tear down a session and every resource in it. Downloaded data stays
    /// on disk.
    fn close_session(
        &self,
        session: SwarmSessionHandle,
    ) -> impl std::future::Future<Output = Result<(), SwarmError>> + Send;
}
