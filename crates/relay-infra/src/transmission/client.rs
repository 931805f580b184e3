//! TransmissionSwarm -- concrete [`SwarmEngine`] backed by a Transmission
//! daemon over its JSON-RPC interface.
//!
//! Transmission has no notion of isolated sessions, so a swarm session here
//! is a logical group: a download directory plus the torrents added through
//! it. A session only ever touches torrents it added itself: a locator the
//! daemon already holds is rejected, so one conversation can never pause,
//! reselect or remove another's transfer. Closing a session removes its
//! torrents from the daemon, keeping the downloaded data.
//!
//! Resources are addressed by info-hash, which stays stable across daemon
//! restarts unlike the numeric torrent id.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};

use relay_core::swarm::SwarmEngine;
use relay_types::config::TransmissionConfig;
use relay_types::error::SwarmError;
use relay_types::fetch::{ResourceHandle, SwarmFile, SwarmSessionHandle, SwarmStats};

use super::types::{
    AddOutcome, FILE_FIELDS, IdsArgs, RpcRequest, RpcResponse, STATS_FIELDS, TorrentAddArgs, TorrentAddResult,
    TorrentGetArgs, TorrentGetResult, TorrentInfo, TorrentRemoveArgs, TorrentSetFilesArgs,
};

const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct SwarmGroup {
    download_dir: PathBuf,
    /// Info-hashes added through this session.
    torrents: Vec<String>,
}

pub struct TransmissionSwarm {
    client: reqwest::Client,
    rpc_url: String,
    username: Option<String>,
    password: Option<SecretString>,
    /// CSRF token handed out by the daemon on a 409 response.
    session_id: Mutex<Option<String>>,
    sessions: DashMap<u64, SwarmGroup>,
    next_session: AtomicU64,
}

impl TransmissionSwarm {
    pub fn new(
        config: &TransmissionConfig,
        password: Option<SecretString>,
    ) -> Result<Self, SwarmError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SwarmError::Rpc(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            username: config.username.clone(),
            password,
            session_id: Mutex::new(None),
            sessions: DashMap::new(),
            next_session: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_session_id(&self, id: String) {
        *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    /// Send one RPC call, performing the session-id handshake at most once.
    async fn rpc<A, R>(&self, method: &'static str, arguments: A) -> Result<RpcResponse<R>, SwarmError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let body = RpcRequest { method, arguments };

        for attempt in 0..2 {
            let mut request = self.client.post(&self.rpc_url).json(&body);
            if let Some(id) = self.current_session_id() {
                request = request.header(SESSION_ID_HEADER, id);
            }
            if let Some(username) = &self.username {
                request = request.basic_auth(
                    username,
                    self.password.as_ref().map(|p| p.expose_secret().to_string()),
                );
            }

            let response = request
                .send()
                .await
                .map_err(|e| SwarmError::Rpc(format!("{method}: {}", e.without_url())))?;
            let status = response.status();

            if status == StatusCode::CONFLICT {
                let issued = response
                    .headers()
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match issued {
                    Some(id) if attempt == 0 => {
                        tracing::debug!("refreshed transmission session id");
                        self.store_session_id(id);
                        continue;
                    }
                    _ => {
                        return Err(SwarmError::Rpc(format!(
                            "{method}: session id handshake failed"
                        )));
                    }
                }
            }
            if status == StatusCode::UNAUTHORIZED {
                return Err(SwarmError::Rpc(format!("{method}: authentication failed")));
            }
            if !status.is_success() {
                return Err(SwarmError::Rpc(format!("{method}: HTTP {status}")));
            }

            return response.json::<RpcResponse<R>>().await.map_err(|e| {
                SwarmError::Deserialization(format!("{method}: {}", e.without_url()))
            });
        }

        Err(SwarmError::Rpc(format!("{method}: session id handshake failed")))
    }

    async fn torrent(&self, resource: &ResourceHandle, fields: &'static [&'static str]) -> Result<TorrentInfo, SwarmError> {
        let args = TorrentGetArgs {
            ids: [resource.0.as_str()],
            fields,
        };
        let result: TorrentGetResult = self.rpc("torrent-get", args).await?.into_arguments()?;
        result
            .torrents
            .into_iter()
            .next()
            .ok_or_else(|| SwarmError::UnknownResource(resource.0.clone()))
    }

    async fn command<A: Serialize>(&self, method: &'static str, arguments: A) -> Result<(), SwarmError> {
        self.rpc::<A, IgnoredAny>(method, arguments).await?.check()
    }

    async fn remove_torrents(&self, hashes: &[String]) -> Result<(), SwarmError> {
        let args = TorrentRemoveArgs {
            ids: hashes.iter().map(String::as_str).collect(),
            delete_local_data: false,
        };
        self.command("torrent-remove", args).await
    }

    /// Forget `session` and return the torrents it added.
    fn release_group(&self, session: SwarmSessionHandle) -> Option<Vec<String>> {
        self.sessions
            .remove(&session.0)
            .map(|(_, group)| group.torrents)
    }
}

/// Split `0..file_count` into wanted and unwanted indices.
fn partition_files(wanted: &BTreeSet<usize>, file_count: usize) -> (Vec<usize>, Vec<usize>) {
    (0..file_count).partition(|index| wanted.contains(index))
}

impl SwarmEngine for TransmissionSwarm {
    async fn create_session(&self, download_dir: &Path) -> Result<SwarmSessionHandle, SwarmError> {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        self.sessions.insert(
            id,
            SwarmGroup {
                download_dir: download_dir.to_path_buf(),
                torrents: Vec::new(),
            },
        );
        tracing::debug!(session = id, dir = %download_dir.display(), "swarm session created");
        Ok(SwarmSessionHandle(id))
    }

    async fn add_resource(
        &self,
        session: SwarmSessionHandle,
        locator: &str,
    ) -> Result<ResourceHandle, SwarmError> {
        let download_dir = self
            .sessions
            .get(&session.0)
            .map(|group| group.download_dir.clone())
            .ok_or_else(|| SwarmError::Session(format!("unknown swarm session {}", session.0)))?;
        let download_dir = download_dir.to_str().ok_or_else(|| {
            SwarmError::Session(format!(
                "download directory is not valid UTF-8: {}",
                download_dir.display()
            ))
        })?;

        let args = TorrentAddArgs {
            filename: locator,
            download_dir,
            paused: false,
        };
        let added = match self
            .rpc::<_, TorrentAddResult>("torrent-add", args)
            .await?
            .into_arguments()?
            .into_outcome()?
        {
            AddOutcome::Added(torrent) => torrent,
            AddOutcome::Duplicate(torrent) => {
                tracing::warn!(
                    session = session.0,
                    hash = %torrent.hash_string,
                    "torrent already present in the daemon, not taking it over"
                );
                let label = if torrent.name.is_empty() {
                    torrent.hash_string
                } else {
                    torrent.name
                };
                return Err(SwarmError::Duplicate(label));
            }
        };

        let registered = match self.sessions.get_mut(&session.0) {
            Some(mut group) => {
                group.torrents.push(added.hash_string.clone());
                true
            }
            None => false,
        };
        if !registered {
            // Session closed while the add was in flight.
            self.remove_torrents(std::slice::from_ref(&added.hash_string))
                .await?;
            return Err(SwarmError::Session(format!(
                "swarm session {} closed",
                session.0
            )));
        }

        tracing::info!(
            session = session.0,
            torrent_id = added.id,
            hash = %added.hash_string,
            name = %added.name,
            "torrent added"
        );
        Ok(ResourceHandle(added.hash_string))
    }

    async fn stats(&self, resource: &ResourceHandle) -> Result<SwarmStats, SwarmError> {
        self.torrent(resource, STATS_FIELDS).await?.to_stats()
    }

    async fn files(&self, resource: &ResourceHandle) -> Result<Vec<SwarmFile>, SwarmError> {
        Ok(self.torrent(resource, FILE_FIELDS).await?.to_files())
    }

    async fn select_files(
        &self,
        resource: &ResourceHandle,
        wanted: &BTreeSet<usize>,
        file_count: usize,
    ) -> Result<(), SwarmError> {
        let (files_wanted, files_unwanted) = partition_files(wanted, file_count);
        let args = TorrentSetFilesArgs {
            ids: [resource.0.as_str()],
            files_wanted,
            files_unwanted,
        };
        self.command("torrent-set", args).await
    }

    async fn start(&self, resource: &ResourceHandle) -> Result<(), SwarmError> {
        let args = IdsArgs {
            ids: vec![resource.0.as_str()],
        };
        self.command("torrent-start", args).await
    }

    async fn stop(&self, resource: &ResourceHandle) -> Result<(), SwarmError> {
        let args = IdsArgs {
            ids: vec![resource.0.as_str()],
        };
        self.command("torrent-stop", args).await
    }

    async fn close_session(&self, session: SwarmSessionHandle) -> Result<(), SwarmError> {
        let Some(owned) = self.release_group(session) else {
            return Ok(());
        };
        tracing::debug!(session = session.0, torrents = owned.len(), "swarm session closed");
        if owned.is_empty() {
            return Ok(());
        }
        self.remove_torrents(&owned).await
    }
}
