//! Progress feed: the channel between a running transfer and its observer.
//!
//! The fetch engine spawns one monitor task per transfer. The monitor polls
//! the swarm engine at a fixed cadence, emits a `ProgressSnapshot` per
//! successful poll, and closes the feed exactly once with a `FeedEnd` that
//! tells the consumer why it stopped.
//!
//! The consumer side is a plain unbounded receiver, so a slow observer never
//! stalls the monitor. `EditThrottle` lets the observer coalesce snapshots
//! into rate-limited message edits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use relay_types::error::SwarmError;
use relay_types::fetch::{ProgressSnapshot, ResourceHandle};

use crate::swarm::SwarmEngine;

/// Consecutive failed polls after which the monitor gives up.
pub const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 5;

/// Why a progress feed closed.
#[derive(Debug, Clone)]
pub enum FeedEnd {
    /// The transfer reached a terminal state.
    Completed,
    /// The engine was closed (cancellation or shutdown).
    Closed,
    /// Polling the swarm engine kept failing.
    Failed(SwarmError),
}

/// Receiving side of a transfer's progress.
pub struct ProgressFeed {
    snapshots: mpsc::UnboundedReceiver<ProgressSnapshot>,
    end: oneshot::Receiver<FeedEnd>,
}

impl ProgressFeed {
    pub(crate) fn channel() -> (FeedSender, Self) {
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (end_tx, end_rx) = oneshot::channel();
        (
            FeedSender {
                snapshots: snapshot_tx,
                end: end_tx,
            },
            Self {
                snapshots: snapshot_rx,
                end: end_rx,
            },
        )
    }

    /// Next snapshot, or `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<ProgressSnapshot> {
        self.snapshots.recv().await
    }

    /// Wait for the close reason. A monitor that vanished without reporting
    /// (aborted task) counts as `Closed`.
    pub async fn finish(self) -> FeedEnd {
        self.end.await.unwrap_or(FeedEnd::Closed)
    }
}

pub(crate) struct FeedSender {
    snapshots: mpsc::UnboundedSender<ProgressSnapshot>,
    end: oneshot::Sender<FeedEnd>,
}

impl FeedSender {
    /// Returns false when the receiver is gone.
    fn send(&self, snapshot: ProgressSnapshot) -> bool {
        self.snapshots.send(snapshot).is_ok()
    }

    fn close(self, reason: FeedEnd) {
        let _ = self.end.send(reason);
    }
}

/// Poll `resource` until it completes, the token is cancelled, the receiver
/// is dropped, or polling fails too many times in a row.
///
/// Reported completed bytes never decrease within one feed.
pub(crate) async fn monitor_transfer<S: SwarmEngine>(
    fetch_id: Uuid,
    swarm: Arc<S>,
    resource: ResourceHandle,
    interval: Duration,
    stop: CancellationToken,
    sender: FeedSender,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut high_water = 0u64;
    let mut failures = 0u32;

    let reason = loop {
        tokio::select! {
            _ = stop.cancelled() => break FeedEnd::Closed,
            _ = ticker.tick() => {}
        }

        let polled = tokio::select! {
            _ = stop.cancelled() => break FeedEnd::Closed,
            polled = swarm.stats(&resource) => polled,
        };

        let mut stats = match polled {
            Ok(stats) => {
                failures = 0;
                stats
            }
            Err(e) => {
                failures += 1;
                warn!(%fetch_id, resource = %resource, failures, error = %e, "progress poll failed");
                if failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                    error!(%fetch_id, resource = %resource, "giving up on transfer after repeated poll failures");
                    break FeedEnd::Failed(e);
                }
                continue;
            }
        };

        high_water = high_water.max(stats.bytes_completed);
        stats.bytes_completed = high_water;

        let complete = stats.is_complete();
        if !sender.send(ProgressSnapshot::from_stats(&stats)) {
            debug!(%fetch_id, "progress receiver dropped, stopping monitor");
            break FeedEnd::Closed;
        }
        if complete {
            info!(%fetch_id, resource = %resource, bytes = stats.bytes_total, "transfer complete");
            break FeedEnd::Completed;
        }
    };

    sender.close(reason);
}

/// Rate limiter for progress-message edits.
#[derive(Debug, Clone)]
pub struct EditThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl EditThrottle {
    /// A throttle that allows the first edit immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// A throttle that treats `now` as the last edit, e.g. right after the
    /// message being edited was sent.
    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: Some(now),
        }
    }

    /// Whether an edit may go out at `now`. Records the edit when it may.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
