//! Configuration loader for magnet-relay.
//!
//! Reads `config.toml` from the data directory (`~/.magnet-relay/` in
//! production) and deserializes it into [`RelayConfig`], falling back to
//! defaults when the file is missing or malformed. Environment variables are
//! applied on top, then path defaults are resolved against the home
//! directory.
//!
//! Secrets (the bot token, the RPC password) are read from the environment
//! only and are returned as [`SecretString`]. A `.env` file in the working
//! directory (or a parent) is loaded into the environment first; variables
//! already set win.
//!
//! Loading runs before the tracing subscriber exists, so problems are
//! collected into [`ResolvedConfig::warnings`] for the caller to log.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Serialize;

use relay_types::config::RelayConfig;
use relay_types::error::ConfigError;

pub const DATA_DIR_ENV: &str = "MAGNET_RELAY_DATA_DIR";
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const DOWNLOAD_PATH_ENV: &str = "DOWNLOAD_PATH";
pub const LOG_PATH_ENV: &str = "LOG_PATH";
pub const MAX_FILE_SIZE_ENV: &str = "MAX_FILE_SIZE";
pub const TRANSMISSION_URL_ENV: &str = "TRANSMISSION_URL";
pub const TRANSMISSION_USERNAME_ENV: &str = "TRANSMISSION_USERNAME";
pub const TRANSMISSION_PASSWORD_ENV: &str = "TRANSMISSION_PASSWORD";

/// Resolve the data directory.
///
/// Priority: `MAGNET_RELAY_DATA_DIR`, then `~/.magnet-relay`, then
/// `./.magnet-relay`.
pub fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = process_env(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".magnet-relay");
    }

    PathBuf::from(".magnet-relay")
}

/// Read a process environment variable, treating empty values as unset.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Load a `.env` file from the working directory or its ancestors.
///
/// Returns the path that was loaded, or `None` when there is no such file.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    dotenv_result(dotenvy::dotenv())
}

/// Load a specific env file; a missing file is not an error.
pub fn load_dotenv_from(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    dotenv_result(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

fn dotenv_result(loaded: Result<PathBuf, dotenvy::Error>) -> Result<Option<PathBuf>, ConfigError> {
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(ConfigError::Dotenv(err.to_string())),
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`RelayConfig::default()`].
/// - Unreadable or unparsable file: records a warning and returns the default.
pub async fn load_config(data_dir: &Path, warnings: &mut Vec<String>) -> RelayConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return RelayConfig::default();
        }
        Err(err) => {
            warnings.push(format!(
                "Failed to read {}: {err}, using defaults",
                config_path.display()
            ));
            return RelayConfig::default();
        }
    };

    match toml::from_str::<RelayConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            warnings.push(format!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            ));
            RelayConfig::default()
        }
    }
}

/// Apply environment overrides on top of the file configuration.
///
/// `env` is injected so tests do not touch the process environment.
pub fn apply_env_overrides(
    config: &mut RelayConfig,
    env: impl Fn(&str) -> Option<String>,
    warnings: &mut Vec<String>,
) {
    if let Some(path) = env(DOWNLOAD_PATH_ENV) {
        config.download_dir = Some(PathBuf::from(path));
    }
    if let Some(path) = env(LOG_PATH_ENV) {
        config.log_dir = Some(PathBuf::from(path));
    }
    if let Some(raw) = env(MAX_FILE_SIZE_ENV) {
        match raw.trim().parse::<u64>() {
            Ok(bytes) if bytes > 0 => config.max_upload_bytes = bytes,
            _ => {
                let fallback = RelayConfig::default().max_upload_bytes;
                warnings.push(format!(
                    "Invalid {MAX_FILE_SIZE_ENV} value '{raw}', using {fallback} bytes"
                ));
                config.max_upload_bytes = fallback;
            }
        }
    }
    if let Some(url) = env(TRANSMISSION_URL_ENV) {
        config.transmission.rpc_url = url;
    }
    if let Some(username) = env(TRANSMISSION_USERNAME_ENV) {
        config.transmission.username = Some(username);
    }
}

/// Configuration with every path made concrete.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub download_dir: PathBuf,
    pub log_dir: PathBuf,
    pub settings: RelayConfig,
    /// Problems met while loading, to be logged once tracing is installed.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

/// Fill in path defaults: downloads under `~/Downloads/magnet-relay`, logs
/// under `<download_dir>/logs`.
pub fn resolve_paths(
    data_dir: PathBuf,
    settings: RelayConfig,
    home: Option<PathBuf>,
) -> Result<ResolvedConfig, ConfigError> {
    let download_dir = match &settings.download_dir {
        Some(dir) => dir.clone(),
        None => home
            .ok_or(ConfigError::NoHomeDir)?
            .join("Downloads")
            .join("magnet-relay"),
    };
    let log_dir = settings
        .log_dir
        .clone()
        .unwrap_or_else(|| download_dir.join("logs"));

    Ok(ResolvedConfig {
        data_dir,
        download_dir,
        log_dir,
        settings,
        warnings: Vec::new(),
    })
}

/// Load the file, apply the process environment, and resolve paths.
pub async fn load(data_dir: PathBuf) -> Result<ResolvedConfig, ConfigError> {
    let mut warnings = Vec::new();
    let mut settings = load_config(&data_dir, &mut warnings).await;
    apply_env_overrides(&mut settings, process_env, &mut warnings);
    let mut resolved = resolve_paths(data_dir, settings, dirs::home_dir())?;
    resolved.warnings = warnings;
    Ok(resolved)
}

/// Create the download and log directories if absent.
pub async fn ensure_dirs(resolved: &ResolvedConfig) -> Result<(), ConfigError> {
    for dir in [&resolved.download_dir, &resolved.log_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ConfigError::Io(format!("failed to create {}: {e}", dir.display())))?;
    }
    Ok(())
}

/// The chat bot token. Never logged.
pub fn load_bot_token(env: impl Fn(&str) -> Option<String>) -> Result<SecretString, ConfigError> {
    env(BOT_TOKEN_ENV)
        .map(SecretString::from)
        .ok_or(ConfigError::MissingToken)
}

pub fn load_transmission_password(env: impl Fn(&str) -> Option<String>) -> Option<SecretString> {
    env(TRANSMISSION_PASSWORD_ENV).map(SecretString::from)
}
