//! Configuration types for magnet-relay.
//!
//! `RelayConfig` represents the top-level `config.toml`. Every field has a
//! default, so an empty file (or no file at all) is a valid configuration.
//! Path fields are optional here; the infrastructure loader resolves them
//! against the user's home directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Root directory downloads land under.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    /// Directory for rotated log files. Defaults to `<download_dir>/logs`.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Largest file the transport will accept as an attachment.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Maximum directory depth searched when a downloaded file is not at its
    /// expected path.
    #[serde(default = "default_search_depth")]
    pub search_depth: usize,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub transmission: TransmissionConfig,
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_search_depth() -> usize {
    8
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            log_dir: None,
            max_upload_bytes: default_max_upload_bytes(),
            search_depth: default_search_depth(),
            timing: TimingConfig::default(),
            telegram: TelegramConfig::default(),
            transmission: TransmissionConfig::default(),
        }
    }
}

/// Timeouts and cadences for the fetch and delivery pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Ceiling on metadata resolution.
    #[serde(default = "default_resolution_timeout_secs")]
    pub resolution_timeout_secs: u64,

    /// How often the swarm engine is polled for status.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum gap between edits of the progress message.
    #[serde(default = "default_progress_edit_interval_secs")]
    pub progress_edit_interval_secs: u64,

    /// Pause between attachment uploads.
    #[serde(default = "default_upload_delay_ms")]
    pub upload_delay_ms: u64,
}

fn default_resolution_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_progress_edit_interval_secs() -> u64 {
    3
}

fn default_upload_delay_ms() -> u64 {
    1_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            resolution_timeout_secs: default_resolution_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            progress_edit_interval_secs: default_progress_edit_interval_secs(),
            upload_delay_ms: default_upload_delay_ms(),
        }
    }
}

impl TimingConfig {
    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_secs(self.resolution_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_edit_interval(&self) -> Duration {
        Duration::from_secs(self.progress_edit_interval_secs)
    }

    pub fn upload_delay(&self) -> Duration {
        Duration::from_millis(self.upload_delay_ms)
    }
}

/// Chat transport endpoint settings. The bot token is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    60
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

/// Swarm engine (Transmission daemon) RPC settings. The password is read
/// from the environment only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default)]
    pub username: Option<String>,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:9091/transmission/rpc".to_string()
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            username: None,
        }
    }
}
