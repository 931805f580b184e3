//! User-facing reply texts.

use relay_types::error::FetchError;
use relay_types::fetch::{FetchableFile, ProgressSnapshot, SwarmStatus, format_bytes};

pub const WELCOME: &str =
    "Welcome to Torrent Downloader Bot!\nSend me a magnet link, and I'll download it for you.";

pub const HELP: &str = "Available commands:\n\
/start - Start the bot\n\
/help - Show this help message\n\
/cancel - Cancel current operation\n\
\n\
Or simply send a magnet link to download a torrent.";

pub const CANCELLED: &str =
    "Current operation cancelled. You can send a new magnet link to start again.";

pub const UNKNOWN_COMMAND: &str = "Unknown command. Use /help to see available commands.";

pub const INVALID_LOCATOR: &str = "That doesn't look like a magnet link. Please send a valid magnet link starting with 'magnet:'.";

pub const SEND_LOCATOR: &str =
    "Send me a magnet link to download a torrent or use /help to see available commands.";

pub const BUSY: &str = "A download is already in progress. Please wait for it to finish, or use /cancel to stop it.";

pub const FETCHING_METADATA: &str = "Fetching torrent metadata... This might take a moment.";

pub const STARTING_DOWNLOAD: &str = "Starting download...";

pub const ALL_DELIVERED: &str =
    "All files have been uploaded! Send another magnet link to download more files.";

/// Numbered file list shown once metadata is resolved.
pub fn file_list(files: &[FetchableFile]) -> String {
    let mut out = String::from(
        "Select files to download by sending their numbers separated by commas (e.g., '1,3,5'):\n\n",
    );
    for (position, file) in files.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", position + 1, file.name));
    }
    out.push_str("\nOr send 'all' to download all files.");
    out
}

fn status_label(status: SwarmStatus) -> &'static str {
    match status {
        SwarmStatus::Resolving => "Resolving",
        SwarmStatus::Downloading => "Downloading",
        SwarmStatus::Stopped => "Stopped",
        SwarmStatus::Seeding => "Seeding",
    }
}

pub fn progress(snapshot: &ProgressSnapshot) -> String {
    format!(
        "Status: {}\nProgress: {:.2}%\nDownloaded: {} / {}\nPeers: {}",
        status_label(snapshot.status),
        snapshot.percent(),
        format_bytes(snapshot.bytes_completed),
        format_bytes(snapshot.bytes_total),
        snapshot.peers,
    )
}

pub fn resolution_failed(err: &FetchError) -> String {
    format!("Error fetching torrent information: {err}")
}

pub fn selection_failed(err: &FetchError) -> String {
    format!("Error selecting files: {err}")
}

pub fn start_failed(err: &FetchError) -> String {
    format!("Error starting download: {err}")
}

pub fn download_failed(err: &FetchError) -> String {
    format!("Download failed: {err}")
}

pub fn download_complete(count: usize) -> String {
    format!("Download complete! Uploading {count} files...")
}
