//! Per-conversation session records.
//!
//! `SessionStore` maps each conversation to exactly one `Session`, created
//! lazily on first contact. Sessions are handed out as `Arc<Mutex<_>>` so
//! every mutation of one conversation is serialized, while different
//! conversations proceed in parallel. `DashMap` guards are never held across
//! an await.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use relay_types::conversation::{ConversationId, ConversationState};
use relay_types::fetch::FetchableFile;

use crate::fetch::{FetchEngine, FetchSettings};
use crate::swarm::SwarmEngine;

/// Mutable state of one conversation.
pub struct Session<S: SwarmEngine> {
    pub(crate) state: ConversationState,
    pub(crate) locator: Option<String>,
    pub(crate) files: Vec<FetchableFile>,
    pub(crate) engine: Arc<FetchEngine<S>>,
    /// Cancelled whenever the fetch is released. Background tasks spawned
    /// for this cycle hold a clone and drop their results once it fires.
    pub(crate) cycle: CancellationToken,
}

impl<S: SwarmEngine + 'static> Session<S> {
    fn new(engine: Arc<FetchEngine<S>>) -> Self {
        Self {
            state: ConversationState::Idle,
            locator: None,
            files: Vec::new(),
            engine,
            cycle: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    pub fn files(&self) -> &[FetchableFile] {
        &self.files
    }

    pub fn engine(&self) -> &Arc<FetchEngine<S>> {
        &self.engine
    }

    /// Swap in `fresh`, clear the per-fetch fields, and end the current
    /// cycle. Returns the previous engine, which the caller must close.
    pub(crate) fn reset_fetch(&mut self, fresh: Arc<FetchEngine<S>>) -> Arc<FetchEngine<S>> {
        self.cycle.cancel();
        self.cycle = CancellationToken::new();
        self.locator = None;
        self.files.clear();
        std::mem::replace(&mut self.engine, fresh)
    }

    fn summary(&self, conversation_id: ConversationId) -> SessionSummary {
        SessionSummary {
            conversation_id,
            state: self.state,
            has_locator: self.locator.is_some(),
            file_count: self.files.len(),
            selected_count: self.files.iter().filter(|f| f.selected).count(),
            fetch_id: self.engine.id(),
        }
    }
}

/// Read-only view of a session, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub conversation_id: ConversationId,
    pub state: ConversationState,
    /// Locators are not exposed; they may be private.
    pub has_locator: bool,
    pub file_count: usize,
    pub selected_count: usize,
    pub fetch_id: Uuid,
}

pub type SharedSession<S> = Arc<Mutex<Session<S>>>;

pub struct SessionStore<S: SwarmEngine> {
    sessions: DashMap<ConversationId, SharedSession<S>>,
    swarm: Arc<S>,
    settings: Arc<FetchSettings>,
}

impl<S: SwarmEngine + 'static> SessionStore<S> {
    pub fn new(swarm: Arc<S>, settings: FetchSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            swarm,
            settings: Arc::new(settings),
        }
    }

    /// A fresh, unresolved engine sharing this store's swarm and settings.
    pub fn new_engine(&self) -> Arc<FetchEngine<S>> {
        Arc::new(FetchEngine::new(
            Arc::clone(&self.swarm),
            Arc::clone(&self.settings),
        ))
    }

    /// The session for `id`, creating an Idle one on first contact.
    ///
    /// Concurrent first contacts for the same id all receive the same record.
    pub fn resolve(&self, id: ConversationId) -> SharedSession<S> {
        if let Some(existing) = self.sessions.get(&id) {
            return Arc::clone(existing.value());
        }

        // Built outside the shard lock; a losing racer's engine is simply dropped.
        let fresh = Arc::new(Mutex::new(Session::new(self.new_engine())));
        let entry = self.sessions.entry(id).or_insert(fresh);
        Arc::clone(entry.value())
    }

    pub fn get(&self, id: ConversationId) -> Option<SharedSession<S>> {
        self.sessions.get(&id).map(|s| Arc::clone(s.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn snapshot(&self) -> Vec<(ConversationId, SharedSession<S>)> {
        self.sessions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Summaries of every known session, ordered by conversation id.
    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let mut out = Vec::new();
        for (id, shared) in self.snapshot() {
            out.push(shared.lock().await.summary(id));
        }
        out.sort_by_key(|s| s.conversation_id);
        out
    }

    pub async fn summary(&self, id: ConversationId) -> Option<SessionSummary> {
        let shared = self.get(id)?;
        let session = shared.lock().await;
        Some(session.summary(id))
    }

    /// Close every session's engine. Used at shutdown.
    pub async fn close_all(&self) {
        for (_, shared) in self.snapshot() {
            let engine = {
                let session = shared.lock().await;
                session.cycle.cancel();
                Arc::clone(&session.engine)
            };
            engine.close().await;
        }
    }
}
