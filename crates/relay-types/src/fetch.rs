//! Fetch-side domain types: swarm statistics, fetchable files, and progress
//! snapshots.
//!
//! A `ProgressSnapshot` is the unit of the progress feed that flows from the
//! fetch engine to the session orchestrator. It is derived from the raw
//! `SwarmStats` reported by the swarm engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a resource inside the swarm engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    /// Metadata is still being negotiated with peers.
    Resolving,
    Downloading,
    Stopped,
    Seeding,
}

impl SwarmStatus {
    /// Whether the resource has reached a status that implies its metadata
    /// (file list) is available.
    pub fn has_metadata(self) -> bool {
        !matches!(self, SwarmStatus::Resolving)
    }
}

impl fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwarmStatus::Resolving => write!(f, "resolving"),
            SwarmStatus::Downloading => write!(f, "downloading"),
            SwarmStatus::Stopped => write!(f, "stopped"),
            SwarmStatus::Seeding => write!(f, "seeding"),
        }
    }
}

impl FromStr for SwarmStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "resolving" => Ok(SwarmStatus::Resolving),
            "downloading" => Ok(SwarmStatus::Downloading),
            "stopped" => Ok(SwarmStatus::Stopped),
            "seeding" => Ok(SwarmStatus::Seeding),
            other => Err(format!("invalid swarm status: '{other}'")),
        }
    }
}

/// Opaque handle to a swarm session created by the swarm engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmSessionHandle(pub u64);

/// Opaque handle to a resource registered within a swarm session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle(pub String);

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw statistics for one resource as reported by the swarm engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmStats {
    pub status: SwarmStatus,
    pub bytes_completed: u64,
    pub bytes_total: u64,
    pub peer_count: u32,
}

impl SwarmStats {
    /// Whether the transfer has reached a terminal state.
    ///
    /// Seeding is always terminal. A stopped resource counts as complete only
    /// once every wanted byte is on disk (some engines stop instead of seeding
    /// when a ratio limit of zero is configured).
    pub fn is_complete(&self) -> bool {
        match self.status {
            SwarmStatus::Seeding => true,
            SwarmStatus::Stopped => {
                self.bytes_total > 0 && self.bytes_completed >= self.bytes_total
            }
            _ => false,
        }
    }
}

/// A file entry as enumerated by the swarm engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmFile {
    /// Path relative to the download root, as laid out by the engine.
    pub relative_path: String,
    pub length: u64,
}

/// One file inside a resolved resource.
///
/// `index` is assigned at resolution time and never renumbered. `selected`
/// defaults to true and is the only field that changes before a fetch starts.
/// `resolved_path` is populated only after a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchableFile {
    pub index: usize,
    /// Display name (final path component).
    pub name: String,
    pub relative_path: String,
    pub size: u64,
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<PathBuf>,
}

impl FetchableFile {
    /// Build the entry for the file at `index` of a freshly resolved resource.
    pub fn from_swarm(index: usize, file: &SwarmFile) -> Self {
        let name = Path::new(&file.relative_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.relative_path.clone());

        Self {
            index,
            name,
            relative_path: file.relative_path.clone(),
            size: file.length,
            selected: true,
            resolved_path: None,
        }
    }
}

/// Completion fraction in `[0, 1]`. A zero total yields `0.0`.
pub fn completion_fraction(bytes_completed: u64, bytes_total: u64) -> f64 {
    if bytes_total == 0 {
        return 0.0;
    }
    (bytes_completed as f64 / bytes_total as f64).clamp(0.0, 1.0)
}

/// A time-stamped view of transfer progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: SwarmStatus,
    /// Completion fraction in `[0, 1]`.
    pub fraction: f64,
    pub bytes_completed: u64,
    pub bytes_total: u64,
    pub peers: u32,
    pub taken_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn from_stats(stats: &SwarmStats) -> Self {
        Self {
            status: stats.status,
            fraction: completion_fraction(stats.bytes_completed, stats.bytes_total),
            bytes_completed: stats.bytes_completed,
            bytes_total: stats.bytes_total,
            peers: stats.peer_count,
            taken_at: Utc::now(),
        }
    }

    /// Completion as a percentage in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}

/// Format a byte count with binary (1024-based) units, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {prefix}B", bytes as f64 / div as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swarm_status_roundtrip() {
        for status in [
            SwarmStatus::Resolving,
            SwarmStatus::Downloading,
            SwarmStatus::Stopped,
            SwarmStatus::Seeding,
        ] {
            let parsed: SwarmStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
        assert!("paused".parse::<SwarmStatus>().is_err());
    }

    #[test]
    fn test_has_metadata() {
        assert!(!SwarmStatus::Resolving.has_metadata());
        assert!(SwarmStatus::Downloading.has_metadata());
        assert!(SwarmStatus::Stopped.has_metadata());
        assert!(SwarmStatus::Seeding.has_metadata());
    }

    #[test]
    fn test_completion_fraction_zero_total() {
        let f = completion_fraction(0, 0);
        assert_eq!(f, 0.0);
        assert!(!f.is_nan());
        assert_eq!(completion_fraction(500, 0), 0.0);
    }

    #[test]
    fn test_completion_fraction_half_and_full() {
        assert_eq!(completion_fraction(500, 1000), 0.5);
        assert_eq!(completion_fraction(1000, 1000), 1.0);
    }

    #[test]
    fn test_completion_fraction_is_clamped() {
        for (done, total) in [(0, 1), (1, 3), (7, 7), (9, 7), (u64::MAX, 1)] {
            let f = completion_fraction(done, total);
            assert!((0.0..=1.0).contains(&f), "{done}/{total} gave {f}");
        }
    }

    #[test]
    fn test_snapshot_from_stats() {
        let snap = ProgressSnapshot::from_stats(&SwarmStats {
            status: SwarmStatus::Downloading,
            bytes_completed: 500,
            bytes_total: 1000,
            peer_count: 4,
        });
        assert_eq!(snap.fraction, 0.5);
        assert_eq!(snap.percent(), 50.0);
        assert_eq!(snap.peers, 4);
    }

    #[test]
    fn test_is_complete() {
        let mut stats = SwarmStats {
            status: SwarmStatus::Downloading,
            bytes_completed: 1000,
            bytes_total: 1000,
            peer_count: 0,
        };
        assert!(!stats.is_complete());
        stats.status = SwarmStatus::Seeding;
        assert!(stats.is_complete());
        stats.status = SwarmStatus::Stopped;
        assert!(stats.is_complete());
        stats.bytes_completed = 10;
        assert!(!stats.is_complete());
    }

    #[test]
    fn test_fetchable_file_name_is_last_component() {
        let file = FetchableFile::from_swarm(
            2,
            &SwarmFile {
                relative_path: "Some Album/disc 1/track.flac".to_string(),
                length: 42,
            },
        );
        assert_eq!(file.index, 2);
        assert_eq!(file.name, "track.flac");
        assert!(file.selected);
        assert!(file.resolved_path.is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
        assert_eq!(format_bytes(u64::MAX), "16.0 EB");
    }
}
