use std::time::Duration;

use thiserror::Error;

/// Failures reported by the swarm engine.
#[derive(Debug, Clone, Error)]
pub enum SwarmError {
    #[error("swarm session error: {0}")]
    Session(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// The daemon already holds this torrent, either from another
    /// conversation or added outside the relay.
    #[error("torrent {0} is already in the download client")]
    Duplicate(String),

    #[error("swarm rpc error: {0}")]
    Rpc(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Errors from fetch engine operations.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The engine was never resolved, or has been closed.
    #[error("no active torrent")]
    NoActiveResource,

    #[error("timeout while fetching torrent metadata (waited {0:?})")]
    ResolutionTimeout(Duration),

    /// `resolve` was called on an engine that already resolved a locator.
    #[error("fetch engine already resolved a locator")]
    AlreadyResolved,

    #[error("transfer already started")]
    AlreadyStarted,

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] SwarmError),
}

/// Coarse classification of failures, mirroring how each one is surfaced to
/// the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    ResolutionTimeout,
    Engine,
    NoActiveResource,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::NoActiveResource => ErrorKind::NoActiveResource,
            FetchError::ResolutionTimeout(_) => ErrorKind::ResolutionTimeout,
            FetchError::InvalidSelection(_) => ErrorKind::InvalidInput,
            FetchError::AlreadyResolved
            | FetchError::AlreadyStarted
            | FetchError::NotFound(_)
            | FetchError::Engine(_) => ErrorKind::Engine,
        }
    }
}

/// Rejections of a file-selection reply. Display text is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Invalid selection format. Please use numbers separated by commas (e.g., '1,3,5').")]
    Malformed(String),

    #[error("Invalid file number: {number}. Please select numbers between 1 and {max}.")]
    OutOfRange { number: i64, max: usize },

    #[error("This torrent has no files to select.")]
    NoFiles,
}

/// Errors from the chat transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("chat API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Per-file delivery failures. Display text is shown to the user.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("File {name} is missing from the download directory")]
    Missing { name: String },

    #[error("Error opening file {name}: {reason}")]
    Open { name: String, reason: String },

    #[error("File {name} is too large to upload ({size} bytes, limit is {limit} bytes)")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("Error uploading file {name}: {source}")]
    Upload {
        name: String,
        #[source]
        source: TransportError,
    },
}

impl DeliveryError {
    pub fn file_name(&self) -> &str {
        match self {
            DeliveryError::Missing { name }
            | DeliveryError::Open { name, .. }
            | DeliveryError::TooLarge { name, .. }
            | DeliveryError::Upload { name, .. } => name,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,

    #[error("could not determine a home directory for the default download path")]
    NoHomeDir,

    #[error("failed to load .env file: {0}")]
    Dotenv(String),

    #[error("filesystem error: {0}")]
    Io(String),
}
