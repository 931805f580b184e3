//! In-memory test doubles for the swarm engine and chat transport.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use relay_types::conversation::{ConversationId, InboundMessage, MessageId, TextFormat};
use relay_types::error::{SwarmError, TransportError};
use relay_types::fetch::{ResourceHandle, SwarmFile, SwarmSessionHandle, SwarmStats, SwarmStatus};

use crate::fetch::FetchSettings;
use crate::swarm::SwarmEngine;
use crate::transport::ChatTransport;

pub(crate) fn stats(status: SwarmStatus, done: u64, total: u64) -> SwarmStats {
    SwarmStats {
        status,
        bytes_completed: done,
        bytes_total: total,
        peer_count: 3,
    }
}

pub(crate) fn fast_settings(root: &Path) -> FetchSettings {
    FetchSettings {
        download_root: root.to_path_buf(),
        resolution_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        search_depth: 4,
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[derive(Default)]
struct FakeSwarmState {
    files: Vec<SwarmFile>,
    script: VecDeque<SwarmStats>,
    next_session: u64,
    next_resource: u64,
    open_sessions: HashSet<u64>,
    closed_sessions: Vec<u64>,
    wanted: Option<BTreeSet<usize>>,
    stats_calls: usize,
    start_calls: usize,
    stop_calls: usize,
    fail_add: Option<SwarmError>,
    fail_start: Option<SwarmError>,
    fail_stats: Option<SwarmError>,
}

/// Scripted swarm engine.
///
/// Successive `stats` calls pop the script; the final entry repeats forever.
/// An empty script reports a stopped resource with metadata available.
#[derive(Default)]
pub(crate) struct FakeSwarm {
    state: Mutex<FakeSwarmState>,
}

impl FakeSwarm {
    pub fn with_files(paths: &[&str]) -> Self {
        let swarm = Self::default();
        swarm.lock().files = paths
            .iter()
            .map(|p| SwarmFile {
                relative_path: (*p).to_string(),
                length: 1000,
            })
            .collect();
        swarm
    }

    pub fn script(self, script: Vec<SwarmStats>) -> Self {
        self.lock().script = script.into();
        self
    }

    pub fn failing_add(self, err: SwarmError) -> Self {
        self.lock().fail_add = Some(err);
        self
    }

    pub fn failing_start(self, err: SwarmError) -> Self {
        self.lock().fail_start = Some(err);
        self
    }

    pub fn fail_stats(&self, err: SwarmError) {
        self.lock().fail_stats = Some(err);
    }

    pub fn open_session_count(&self) -> usize {
        self.lock().open_sessions.len()
    }

    pub fn closed_sessions(&self) -> Vec<u64> {
        self.lock().closed_sessions.clone()
    }

    pub fn wanted(&self) -> Option<BTreeSet<usize>> {
        self.lock().wanted.clone()
    }

    pub fn stats_calls(&self) -> usize {
        self.lock().stats_calls
    }

    pub fn start_calls(&self) -> usize {
        self.lock().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.lock().stop_calls
    }

    fn lock(&self) -> MutexGuard<'_, FakeSwarmState> {
        self.state.lock().unwrap()
    }
}

impl SwarmEngine for FakeSwarm {
    async fn create_session(&self, _download_dir: &Path) -> Result<SwarmSessionHandle, SwarmError> {
        let mut state = self.lock();
        state.next_session += 1;
        let id = state.next_session;
        state.open_sessions.insert(id);
        Ok(SwarmSessionHandle(id))
    }

    async fn add_resource(
        &self,
        session: SwarmSessionHandle,
        _locator: &str,
    ) -> Result<ResourceHandle, SwarmError> {
        let mut state = self.lock();
        if let Some(err) = state.fail_add.clone() {
            return Err(err);
        }
        if !state.open_sessions.contains(&session.0) {
            return Err(SwarmError::Session(format!("unknown session {}", session.0)));
        }
        state.next_resource += 1;
        Ok(ResourceHandle(state.next_resource.to_string()))
    }

    async fn stats(&self, _resource: &ResourceHandle) -> Result<SwarmStats, SwarmError> {
        let mut state = self.lock();
        state.stats_calls += 1;
        if let Some(err) = state.fail_stats.clone() {
            return Err(err);
        }
        let next = if state.script.len() > 1 {
            state.script.pop_front()
        } else {
            state.script.front().cloned()
        };
        Ok(next.unwrap_or_else(|| stats(SwarmStatus::Stopped, 0, 0)))
    }

    async fn files(&self, _resource: &ResourceHandle) -> Result<Vec<SwarmFile>, SwarmError> {
        Ok(self.lock().files.clone())
    }

    async fn select_files(
        &self,
        _resource: &ResourceHandle,
        wanted: &BTreeSet<usize>,
        _file_count: usize,
    ) -> Result<(), SwarmError> {
        self.lock().wanted = Some(wanted.clone());
        Ok(())
    }

    async fn start(&self, _resource: &ResourceHandle) -> Result<(), SwarmError> {
        let mut state = self.lock();
        if let Some(err) = state.fail_start.clone() {
            return Err(err);
        }
        state.start_calls += 1;
        Ok(())
    }

    async fn stop(&self, _resource: &ResourceHandle) -> Result<(), SwarmError> {
        self.lock().stop_calls += 1;
        Ok(())
    }

    async fn close_session(&self, session: SwarmSessionHandle) -> Result<(), SwarmError> {
        let mut state = self.lock();
        state.open_sessions.remove(&session.0);
        state.closed_sessions.push(session.0);
        Ok(())
    }
}

/// One outbound call recorded by `RecordingTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Text {
        conversation: ConversationId,
        id: MessageId,
        text: String,
        format: TextFormat,
    },
    Edit {
        conversation: ConversationId,
        id: MessageId,
        text: String,
    },
    Document {
        conversation: ConversationId,
        filename: String,
        caption: String,
        size: usize,
    },
}

/// Transport that records every outbound call and serves queued inbound
/// batches.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    log: Mutex<Vec<Sent>>,
    inbox: Mutex<VecDeque<Result<Vec<InboundMessage>, TransportError>>>,
    failing_documents: Mutex<HashSet<String>>,
    next_id: AtomicI64,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    /// Texts of new messages (not edits) in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Every edit applied to `id`, in order.
    pub fn edits_of(&self, id: MessageId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit { id: edited, text, .. } if edited == id => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Id of the first new message whose text equals `text`.
    pub fn id_of(&self, text: &str) -> Option<MessageId> {
        self.sent().into_iter().find_map(|s| match s {
            Sent::Text { id, text: sent, .. } if sent == text => Some(id),
            _ => None,
        })
    }

    pub fn documents(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document { filename, .. } => Some(filename),
                _ => None,
            })
            .collect()
    }

    pub fn fail_document(&self, filename: &str) {
        self.failing_documents
            .lock()
            .unwrap()
            .insert(filename.to_string());
    }

    pub fn push_updates(&self, batch: Result<Vec<InboundMessage>, TransportError>) {
        self.inbox.lock().unwrap().push_back(batch);
    }

    fn next_message_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl ChatTransport for RecordingTransport {
    async fn poll_updates(&self) -> Result<Vec<InboundMessage>, TransportError> {
        let next = self.inbox.lock().unwrap().pop_front();
        match next {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageId, TransportError> {
        let id = self.next_message_id();
        self.log.lock().unwrap().push(Sent::Text {
            conversation,
            id,
            text: text.to_string(),
            format,
        });
        Ok(id)
    }

    async fn edit_text(
        &self,
        conversation: ConversationId,
        message: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        self.log.lock().unwrap().push(Sent::Edit {
            conversation,
            id: message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_document(
        &self,
        conversation: ConversationId,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<MessageId, TransportError> {
        if self.failing_documents.lock().unwrap().contains(filename) {
            return Err(TransportError::Api {
                code: 413,
                description: "Request Entity Too Large".into(),
            });
        }
        let id = self.next_message_id();
        self.log.lock().unwrap().push(Sent::Document {
            conversation,
            filename: filename.to_string(),
            caption: caption.to_string(),
            size: bytes.len(),
        });
        Ok(id)
    }
}
