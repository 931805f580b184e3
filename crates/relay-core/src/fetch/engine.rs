//! FetchEngine: one swarm session and at most one resource per conversation.
//!
//! Lifecycle: `resolve` -> `select` -> `start` -> (`completed_files`) ->
//! `close`. Each engine is single-use; the session store replaces a closed
//! engine with a fresh one rather than reviving it.
//!
//! The engine keeps its own bookkeeping behind a short-lived `std` mutex that
//! is never held across an await. Handles returned by the swarm are recorded
//! as soon as they exist, so `close` can always release whatever was
//! allocated, even while `resolve` is still waiting on metadata.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relay_types::error::{FetchError, SwarmError};
use relay_types::fetch::{FetchableFile, ResourceHandle, SwarmSessionHandle};

use super::locate::locate_file;
use super::progress::{ProgressFeed, monitor_transfer};
use crate::swarm::SwarmEngine;

/// Tunables shared by every engine the session store creates.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Directory the swarm engine writes downloads under.
    pub download_root: PathBuf,
    pub resolution_timeout: Duration,
    pub poll_interval: Duration,
    /// Depth bound for the by-name fallback search in `completed_files`.
    pub search_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Resolving,
    Resolved,
    Transferring,
    Closed,
}

struct Inner {
    phase: Phase,
    session: Option<SwarmSessionHandle>,
    resource: Option<ResourceHandle>,
    files: Vec<FetchableFile>,
    monitor: Option<JoinHandle<()>>,
}

pub struct FetchEngine<S: SwarmEngine> {
    id: Uuid,
    swarm: Arc<S>,
    settings: Arc<FetchSettings>,
    shutdown: CancellationToken,
    inner: Mutex<Inner>,
}

impl<S: SwarmEngine + 'static> FetchEngine<S> {
    pub fn new(swarm: Arc<S>, settings: Arc<FetchSettings>) -> Self {
        Self {
            id: Uuid::now_v7(),
            swarm,
            settings,
            shutdown: CancellationToken::new(),
            inner: Mutex::new(Inner {
                phase: Phase::Fresh,
                session: None,
                resource: None,
                files: Vec::new(),
                monitor: None,
            }),
        }
    }

    /// Correlation id attached to every log line about this engine.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.lock().phase == Phase::Closed
    }

    /// Current file list (empty until resolved).
    pub fn files(&self) -> Vec<FetchableFile> {
        self.lock().files.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `record` against the bookkeeping unless the engine was closed in
    /// the meantime. Returns false when closed.
    fn record(&self, record: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.lock();
        if inner.phase == Phase::Closed {
            return false;
        }
        record(&mut inner);
        true
    }

    /// Register `locator`, wait for its metadata, and return the file list
    /// with every file selected. The resource is stopped afterwards so no
    /// payload is fetched before the user chooses.
    pub async fn resolve(&self, locator: &str) -> Result<Vec<FetchableFile>, FetchError> {
        {
            let mut inner = self.lock();
            match inner.phase {
                Phase::Fresh => inner.phase = Phase::Resolving,
                Phase::Closed => return Err(FetchError::NoActiveResource),
                _ => return Err(FetchError::AlreadyResolved),
            }
        }

        info!(fetch_id = %self.id, "fetching torrent metadata");

        let session = self
            .swarm
            .create_session(&self.settings.download_root)
            .await?;
        if !self.record(|inner| inner.session = Some(session)) {
            self.discard_session(session).await;
            return Err(FetchError::NoActiveResource);
        }

        let resource = self.swarm.add_resource(session, locator).await?;
        if !self.record(|inner| inner.resource = Some(resource.clone())) {
            self.discard_session(session).await;
            return Err(FetchError::NoActiveResource);
        }

        self.wait_for_metadata(&resource).await?;

        let layout = self.swarm.files(&resource).await?;
        if layout.is_empty() {
            return Err(SwarmError::Resource("torrent contains no files".into()).into());
        }
        self.swarm.stop(&resource).await?;

        let files: Vec<FetchableFile> = layout
            .iter()
            .enumerate()
            .map(|(index, file)| FetchableFile::from_swarm(index, file))
            .collect();

        let recorded = self.record(|inner| {
            inner.files = files.clone();
            inner.phase = Phase::Resolved;
        });
        if !recorded {
            return Err(FetchError::NoActiveResource);
        }

        info!(fetch_id = %self.id, files = files.len(), "torrent metadata resolved");
        Ok(files)
    }

    async fn wait_for_metadata(&self, resource: &ResourceHandle) -> Result<(), FetchError> {
        let timeout = self.settings.resolution_timeout;
        let poll = async {
            loop {
                let stats = self.swarm.stats(resource).await?;
                if stats.status.has_metadata() {
                    return Ok::<(), SwarmError>(());
                }
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(FetchError::NoActiveResource),
            waited = tokio::time::timeout(timeout, poll) => match waited {
                Ok(polled) => polled.map_err(FetchError::from),
                Err(_) => {
                    warn!(fetch_id = %self.id, ?timeout, "metadata resolution timed out");
                    Err(FetchError::ResolutionTimeout(timeout))
                }
            },
        }
    }

    /// Replace the selection with exactly `indices` (0-based). On error the
    /// previous selection is left untouched.
    pub fn select(&self, indices: &BTreeSet<usize>) -> Result<(), FetchError> {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Resolved => {}
            Phase::Transferring => return Err(FetchError::AlreadyStarted),
            _ => return Err(FetchError::NoActiveResource),
        }

        if indices.is_empty() {
            return Err(FetchError::InvalidSelection("no files selected".into()));
        }
        let count = inner.files.len();
        if let Some(bad) = indices.iter().find(|&&index| index >= count) {
            return Err(FetchError::InvalidSelection(format!(
                "file index {bad} is out of range for {count} files"
            )));
        }

        for file in inner.files.iter_mut() {
            file.selected = indices.contains(&file.index);
        }
        debug!(fetch_id = %self.id, selected = ?indices, "file selection updated");
        Ok(())
    }

    /// Begin transferring the selected files and return the progress feed.
    pub async fn start(&self) -> Result<ProgressFeed, FetchError> {
        let (resource, wanted, file_count) = {
            let mut inner = self.lock();
            match inner.phase {
                Phase::Resolved => {}
                Phase::Transferring => return Err(FetchError::AlreadyStarted),
                _ => return Err(FetchError::NoActiveResource),
            }
            let resource = inner.resource.clone().ok_or(FetchError::NoActiveResource)?;
            let wanted: BTreeSet<usize> = inner
                .files
                .iter()
                .filter(|f| f.selected)
                .map(|f| f.index)
                .collect();
            inner.phase = Phase::Transferring;
            (resource, wanted, inner.files.len())
        };

        self.swarm
            .select_files(&resource, &wanted, file_count)
            .await?;
        self.swarm.start(&resource).await?;

        let (sender, feed) = ProgressFeed::channel();
        let monitor = tokio::spawn(monitor_transfer(
            self.id,
            Arc::clone(&self.swarm),
            resource,
            self.settings.poll_interval,
            self.shutdown.child_token(),
            sender,
        ));

        let mut inner = self.lock();
        if inner.phase == Phase::Closed {
            monitor.abort();
            return Err(FetchError::NoActiveResource);
        }
        inner.monitor = Some(monitor);
        drop(inner);

        info!(fetch_id = %self.id, files = wanted.len(), "transfer started");
        Ok(feed)
    }

    /// Selected files with their on-disk paths filled in.
    pub async fn completed_files(&self) -> Result<Vec<FetchableFile>, FetchError> {
        let (resource, selected) = {
            let inner = self.lock();
            if inner.phase != Phase::Transferring {
                return Err(FetchError::NoActiveResource);
            }
            let resource = inner.resource.clone().ok_or(FetchError::NoActiveResource)?;
            let selected: Vec<FetchableFile> =
                inner.files.iter().filter(|f| f.selected).cloned().collect();
            (resource, selected)
        };

        // The engine may have renamed things since resolution.
        let layout = self.swarm.files(&resource).await?;

        let mut done = Vec::with_capacity(selected.len());
        for mut file in selected {
            let relative = layout
                .get(file.index)
                .map(|f| f.relative_path.as_str())
                .unwrap_or(file.relative_path.as_str());
            let path = locate_file(&self.settings.download_root, relative, self.settings.search_depth)
                .await
                .ok_or_else(|| FetchError::NotFound(file.name.clone()))?;
            file.resolved_path = Some(path);
            done.push(file);
        }

        self.record(|inner| {
            for file in &done {
                if let Some(slot) = inner.files.get_mut(file.index) {
                    slot.resolved_path.clone_from(&file.resolved_path);
                }
            }
        });

        Ok(done)
    }

    /// Stop any transfer and release the swarm session. Idempotent; after
    /// this every other operation fails with `NoActiveResource`.
    pub async fn close(&self) {
        self.shutdown.cancel();

        let (session, monitor) = {
            let mut inner = self.lock();
            if inner.phase == Phase::Closed {
                return;
            }
            inner.phase = Phase::Closed;
            inner.resource = None;
            (inner.session.take(), inner.monitor.take())
        };

        if let Some(monitor) = monitor {
            if let Err(e) = monitor.await {
                if !e.is_cancelled() {
                    warn!(fetch_id = %self.id, error = %e, "progress monitor ended abnormally");
                }
            }
        }

        if let Some(session) = session {
            self.discard_session(session).await;
        }

        info!(fetch_id = %self.id, "fetch engine closed");
    }

    async fn discard_session(&self, session: SwarmSessionHandle) {
        if let Err(e) = self.swarm.close_session(session).await {
            warn!(fetch_id = %self.id, error = %e, "failed to close swarm session");
        }
    }
}

impl<S: SwarmEngine> Drop for FetchEngine<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use relay_types::fetch::SwarmStatus;

    use crate::fetch::progress::FeedEnd;
    use crate::testing::{FakeSwarm, fast_settings, stats};

    const LOCATOR: &str = "magnet:?xt=urn:btih:abc";

    fn engine(swarm: FakeSwarm, root: &std::path::Path) -> (FetchEngine<FakeSwarm>, Arc<FakeSwarm>) {
        let swarm = Arc::new(swarm);
        let engine = FetchEngine::new(Arc::clone(&swarm), Arc::new(fast_settings(root)));
        (engine, swarm)
    }

    fn three_files() -> FakeSwarm {
        FakeSwarm::with_files(&["a.txt", "b.mkv", "c.iso"])
    }

    #[tokio::test]
    async fn test_resolve_lists_all_files_selected() {
        let root = tempfile::tempdir().unwrap();
        let (engine, swarm) = engine(three_files(), root.path());

        let files = engine.resolve(LOCATOR).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.mkv", "c.iso"]);
        assert!(files.iter().all(|f| f.selected));
        assert_eq!(files.iter().map(|f| f.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(swarm.stop_calls(), 1, "resource is paused after metadata");
    }

    #[tokio::test]
    async fn test_resolve_twice_fails() {
        let root = tempfile::tempdir().unwrap();
        let (engine, _) = engine(three_files(), root.path());
        engine.resolve(LOCATOR).await.unwrap();
        assert!(matches!(
            engine.resolve(LOCATOR).await,
            Err(FetchError::AlreadyResolved)
        ));
    }

    #[tokio::test]
    async fn test_resolution_timeout() {
        let root = tempfile::tempdir().unwrap();
        let (engine, _) = engine(
            three_files().script(vec![stats(SwarmStatus::Resolving, 0, 0)]),
            root.path(),
        );
        let err = engine.resolve(LOCATOR).await.unwrap_err();
        assert!(matches!(err, FetchError::ResolutionTimeout(_)));
        assert!(engine.files().is_empty());
    }

    #[tokio::test]
    async fn test_select_before_resolve() {
        let root = tempfile::tempdir().unwrap();
        let (engine, _) = engine(three_files(), root.path());
        assert!(matches!(
            engine.select(&BTreeSet::from([0])),
            Err(FetchError::NoActiveResource)
        ));
        assert!(matches!(engine.start().await, Err(FetchError::NoActiveResource)));
    }

    #[tokio::test]
    async fn test_select_is_absolute() {
        let root = tempfile::tempdir().unwrap();
        let (engine, _) = engine(three_files(), root.path());
        engine.resolve(LOCATOR).await.unwrap();

        engine.select(&BTreeSet::from([0, 2])).unwrap();
        engine.select(&BTreeSet::from([1])).unwrap();

        let selected: Vec<usize> = engine
            .files()
            .iter()
            .filter(|f| f.selected)
            .map(|f| f.index)
            .collect();
        assert_eq!(selected, vec![1]);
    }

    #[tokio::test]
    async fn test_invalid_select_leaves_selection_unchanged() {
        let root = tempfile::tempdir().unwrap();
        let (engine, _) = engine(three_files(), root.path());
        engine.resolve(LOCATOR).await.unwrap();
        engine.select(&BTreeSet::from([2])).unwrap();

        assert!(matches!(
            engine.select(&BTreeSet::from([0, 3])),
            Err(FetchError::InvalidSelection(_))
        ));
        assert!(matches!(
            engine.select(&BTreeSet::new()),
            Err(FetchError::InvalidSelection(_))
        ));

        let selected: Vec<usize> = engine
            .files()
            .iter()
            .filter(|f| f.selected)
            .map(|f| f.index)
            .collect();
        assert_eq!(selected, vec![2]);
    }

    #[tokio::test]
    async fn test_start_passes_selection_and_feeds_progress() {
        let root = tempfile::tempdir().unwrap();
        let (engine, swarm) = engine(
            FakeSwarm::with_files(&["big.bin"]).script(vec![
                stats(SwarmStatus::Stopped, 0, 1000),
                stats(SwarmStatus::Downloading, 500, 1000),
                stats(SwarmStatus::Seeding, 1000, 1000),
            ]),
            root.path(),
        );
        engine.resolve(LOCATOR).await.unwrap();
        let mut feed = engine.start().await.unwrap();

        let mut fractions = Vec::new();
        while let Some(snapshot) = feed.recv().await {
            fractions.push(snapshot.fraction);
        }
        assert_eq!(fractions, vec![0.5, 1.0]);
        assert!(matches!(feed.finish().await, FeedEnd::Completed));
        assert_eq!(swarm.wanted(), Some(BTreeSet::from([0])));
        assert_eq!(swarm.start_calls(), 1);

        assert!(matches!(engine.start().await, Err(FetchError::AlreadyStarted)));
        assert!(matches!(
            engine.select(&BTreeSet::from([0])),
            Err(FetchError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let root = tempfile::tempdir().unwrap();
        let (engine, swarm) = engine(three_files(), root.path());
        engine.resolve(LOCATOR).await.unwrap();

        engine.close().await;
        engine.close().await;

        assert!(engine.is_closed());
        assert_eq!(swarm.closed_sessions().len(), 1);
        assert_eq!(swarm.open_session_count(), 0);
        assert!(matches!(
            engine.select(&BTreeSet::from([0])),
            Err(FetchError::NoActiveResource)
        ));
        assert!(matches!(engine.start().await, Err(FetchError::NoActiveResource)));
        assert!(matches!(
            engine.resolve(LOCATOR).await,
            Err(FetchError::NoActiveResource)
        ));
    }

    #[tokio::test]
    async fn test_close_interrupts_resolution() {
        let root = tempfile::tempdir().unwrap();
        let swarm = Arc::new(three_files().script(vec![stats(SwarmStatus::Resolving, 0, 0)]));
        let settings = FetchSettings {
            resolution_timeout: Duration::from_secs(30),
            ..fast_settings(root.path())
        };
        let engine = Arc::new(FetchEngine::new(Arc::clone(&swarm), Arc::new(settings)));

        let resolving = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.resolve(LOCATOR).await })
        };
        crate::testing::eventually(|| swarm.stats_calls() > 0).await;
        engine.close().await;

        let result = resolving.await.unwrap();
        assert!(matches!(result, Err(FetchError::NoActiveResource)));
        assert_eq!(swarm.open_session_count(), 0);
    }

    #[tokio::test]
    async fn test_close_stops_monitor() {
        let root = tempfile::tempdir().unwrap();
        let (engine, _) = engine(
            FakeSwarm::with_files(&["big.bin"]).script(vec![
                stats(SwarmStatus::Stopped, 0, 1000),
                stats(SwarmStatus::Downloading, 10, 1000),
            ]),
            root.path(),
        );
        engine.resolve(LOCATOR).await.unwrap();
        let mut feed = engine.start().await.unwrap();
        assert!(feed.recv().await.is_some());

        engine.close().await;
        while feed.recv().await.is_some() {}
        assert!(matches!(feed.finish().await, FeedEnd::Closed));
    }

    #[tokio::test]
    async fn test_completed_files_uses_expected_then_fallback_path() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("pack")).unwrap();
        std::fs::write(root.path().join("pack/a.txt"), "alpha").unwrap();
        std::fs::create_dir_all(root.path().join("elsewhere")).unwrap();
        std::fs::write(root.path().join("elsewhere/c.iso"), "iso").unwrap();

        let (engine, _) = engine(
            FakeSwarm::with_files(&["pack/a.txt", "pack/b.mkv", "pack/c.iso"]).script(vec![
                stats(SwarmStatus::Stopped, 0, 3000),
                stats(SwarmStatus::Seeding, 3000, 3000),
            ]),
            root.path(),
        );
        engine.resolve(LOCATOR).await.unwrap();
        engine.select(&BTreeSet::from([0, 2])).unwrap();
        let mut feed = engine.start().await.unwrap();
        while feed.recv().await.is_some() {}

        let done = engine.completed_files().await.unwrap();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].resolved_path, Some(root.path().join("pack/a.txt")));
        assert_eq!(done[1].resolved_path, Some(root.path().join("elsewhere/c.iso")));
    }

    #[tokio::test]
    async fn test_completed_files_not_found() {
        let root = tempfile::tempdir().unwrap();
        let (engine, _) = engine(
            FakeSwarm::with_files(&["ghost.bin"]).script(vec![
                stats(SwarmStatus::Stopped, 0, 10),
                stats(SwarmStatus::Seeding, 10, 10),
            ]),
            root.path(),
        );
        engine.resolve(LOCATOR).await.unwrap();
        let mut feed = engine.start().await.unwrap();
        while feed.recv().await.is_some() {}

        match engine.completed_files().await {
            Err(FetchError::NotFound(name)) => assert_eq!(name, "ghost.bin"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_failure_surfaces_engine_error() {
        let root = tempfile::tempdir().unwrap();
        let (engine, _) = engine(
            three_files().failing_add(SwarmError::Resource("invalid or corrupt torrent".into())),
            root.path(),
        );
        let err = engine.resolve(LOCATOR).await.unwrap_err();
        assert!(matches!(err, FetchError::Engine(SwarmError::Resource(_))));
    }
}
