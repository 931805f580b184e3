//! Session orchestrator.
//!
//! Routes each inbound message through the state machine and performs the
//! resulting effects against the fetch engine and the transport. Slow work
//! (metadata resolution, the transfer itself, delivery) runs in background
//! tasks so a conversation's lock is only held for bounded steps.
//!
//! Every background task captures the session's `cycle` token. Releasing the
//! fetch cancels that token, so results from a superseded cycle are dropped
//! instead of being applied to a session that has moved on.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relay_types::conversation::{ConversationId, InboundMessage, MessageId, TextFormat};
use relay_types::error::{ErrorKind, FetchError};

use super::machine::{Command, Effect, Input, Transition, transition};
use super::replies;
use super::store::{Session, SessionStore, SharedSession};
use crate::delivery::{DeliverySettings, DeliveryStage};
use crate::fetch::{EditThrottle, FeedEnd, FetchEngine, ProgressFeed};
use crate::swarm::SwarmEngine;
use crate::transport::ChatTransport;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Minimum gap between edits of the progress message.
    pub progress_edit_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            progress_edit_interval: Duration::from_secs(3),
        }
    }
}

pub struct Orchestrator<T: ChatTransport, S: SwarmEngine> {
    transport: Arc<T>,
    store: Arc<SessionStore<S>>,
    delivery: DeliveryStage<T>,
    settings: OrchestratorSettings,
}

impl<T, S> Orchestrator<T, S>
where
    T: ChatTransport + 'static,
    S: SwarmEngine + 'static,
{
    pub fn new(
        transport: Arc<T>,
        store: Arc<SessionStore<S>>,
        delivery: DeliverySettings,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            delivery: DeliveryStage::new(Arc::clone(&transport), delivery),
            transport,
            store,
            settings,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<SessionStore<S>> {
        &self.store
    }

    /// Process one inbound message for its conversation.
    ///
    /// Messages for the same conversation must be handed in arrival order;
    /// the session lock serializes them against background tasks.
    pub async fn handle_message(self: &Arc<Self>, message: InboundMessage) {
        let conversation = message.conversation_id;
        let shared = self.store.resolve(conversation);
        let mut session = shared.lock().await;

        let input = match message.command.as_deref() {
            Some(name) => Input::Command(Command::parse(name)),
            None => Input::Text(&message.text),
        };
        let previous = session.state;
        let Transition { next, effects } = transition(previous, input, session.files.len());
        session.state = next;
        if previous != next {
            debug!(%conversation, from = %previous, to = %next, "conversation state changed");
        }

        for effect in effects {
            match effect {
                Effect::Reply(text) => self.reply(conversation, &text).await,
                Effect::ReleaseFetch => self.release_fetch(&mut session).await,
                Effect::BeginResolution { locator } => {
                    self.begin_resolution(conversation, &shared, &mut session, locator)
                        .await;
                }
                Effect::StartFetch { indices } => {
                    self.start_fetch(conversation, &shared, &mut session, indices)
                        .await;
                }
                Effect::PresentFiles => {
                    warn!(%conversation, "file listing requested outside of resolution");
                }
            }
        }
    }

    /// Close the current engine and install a fresh one.
    async fn release_fetch(&self, session: &mut Session<S>) {
        let previous = session.reset_fetch(self.store.new_engine());
        previous.close().await;
    }

    async fn begin_resolution(
        self: &Arc<Self>,
        conversation: ConversationId,
        shared: &SharedSession<S>,
        session: &mut Session<S>,
        locator: String,
    ) {
        session.locator = Some(locator.clone());
        let ack = self.send(conversation, replies::FETCHING_METADATA).await;

        let engine = Arc::clone(&session.engine);
        let cycle = session.cycle.clone();
        let shared = Arc::clone(shared);
        let this = Arc::clone(self);
        info!(%conversation, fetch_id = %engine.id(), "resolving locator");

        tokio::spawn(async move {
            this.run_resolution(conversation, shared, engine, cycle, locator, ack)
                .await;
        });
    }

    async fn run_resolution(
        &self,
        conversation: ConversationId,
        shared: SharedSession<S>,
        engine: Arc<FetchEngine<S>>,
        cycle: CancellationToken,
        locator: String,
        ack: Option<MessageId>,
    ) {
        let outcome = engine.resolve(&locator).await;

        let mut session = shared.lock().await;
        if cycle.is_cancelled() {
            debug!(%conversation, fetch_id = %engine.id(), "discarding result of superseded resolution");
            return;
        }

        match outcome {
            Ok(files) => {
                let Transition { next, effects } =
                    transition(session.state, Input::MetadataResolved, files.len());
                session.state = next;
                if effects.contains(&Effect::PresentFiles) {
                    let listing = replies::file_list(&files);
                    session.files = files;
                    self.edit_or_send(conversation, ack, &listing).await;
                }
            }
            Err(err) => {
                log_fetch_error(conversation, &engine, &err, "metadata resolution failed");
                let Transition { next, effects } =
                    transition(session.state, Input::MetadataFailed, 0);
                session.state = next;
                self.edit_or_send(conversation, ack, &replies::resolution_failed(&err))
                    .await;
                if effects.contains(&Effect::ReleaseFetch) {
                    self.release_fetch(&mut session).await;
                }
            }
        }
    }

    async fn start_fetch(
        self: &Arc<Self>,
        conversation: ConversationId,
        shared: &SharedSession<S>,
        session: &mut Session<S>,
        indices: BTreeSet<usize>,
    ) {
        let engine = Arc::clone(&session.engine);

        if let Err(err) = engine.select(&indices) {
            log_fetch_error(conversation, &engine, &err, "file selection failed");
            self.reply(conversation, &replies::selection_failed(&err))
                .await;
            self.end_fetch(session).await;
            return;
        }
        session.files = engine.files();

        let progress = self.send(conversation, replies::STARTING_DOWNLOAD).await;

        let feed = match engine.start().await {
            Ok(feed) => feed,
            Err(err) => {
                log_fetch_error(conversation, &engine, &err, "transfer start failed");
                self.edit_or_send(conversation, progress, &replies::start_failed(&err))
                    .await;
                self.end_fetch(session).await;
                return;
            }
        };

        let cycle = session.cycle.clone();
        let shared = Arc::clone(shared);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_transfer(conversation, shared, engine, cycle, feed, progress)
                .await;
        });
    }

    /// Follow the progress feed, then locate and deliver the files.
    async fn run_transfer(
        &self,
        conversation: ConversationId,
        shared: SharedSession<S>,
        engine: Arc<FetchEngine<S>>,
        cycle: CancellationToken,
        mut feed: ProgressFeed,
        progress: Option<MessageId>,
    ) {
        let mut throttle =
            EditThrottle::starting_at(self.settings.progress_edit_interval, Instant::now());

        while let Some(snapshot) = feed.recv().await {
            if cycle.is_cancelled() {
                break;
            }
            if let Some(message) = progress {
                if throttle.ready(Instant::now()) {
                    let text = replies::progress(&snapshot);
                    if let Err(e) = self.transport.edit_text(conversation, message, &text).await {
                        debug!(%conversation, error = %e, "progress edit failed");
                    }
                }
            }
        }
        if cycle.is_cancelled() {
            debug!(%conversation, fetch_id = %engine.id(), "transfer superseded");
            return;
        }

        let completed = match feed.finish().await {
            FeedEnd::Completed => engine.completed_files().await,
            FeedEnd::Failed(e) => Err(FetchError::from(e)),
            FeedEnd::Closed => {
                debug!(%conversation, fetch_id = %engine.id(), "transfer feed closed");
                return;
            }
        };
        if cycle.is_cancelled() {
            return;
        }

        let files = match completed {
            Ok(files) => files,
            Err(err) => {
                log_fetch_error(conversation, &engine, &err, "transfer failed");
                self.edit_or_send(conversation, progress, &replies::download_failed(&err))
                    .await;
                self.finish_cycle(&shared, &cycle).await;
                return;
            }
        };

        self.edit_or_send(conversation, progress, &replies::download_complete(files.len()))
            .await;
        let report = self.delivery.deliver(conversation, &files, &cycle).await;
        debug!(%conversation, fetch_id = %engine.id(), ?report, "delivery report");

        self.finish_cycle(&shared, &cycle).await;
    }

    /// Return a Fetching session to Idle unless its cycle was superseded.
    async fn finish_cycle(&self, shared: &SharedSession<S>, cycle: &CancellationToken) {
        let mut session = shared.lock().await;
        if cycle.is_cancelled() {
            return;
        }
        self.end_fetch(&mut session).await;
    }

    async fn end_fetch(&self, session: &mut Session<S>) {
        let Transition { next, effects } =
            transition(session.state, Input::FetchEnded, session.files.len());
        session.state = next;
        if effects.contains(&Effect::ReleaseFetch) {
            self.release_fetch(session).await;
        }
    }

    /// Send a plain message, returning its id when the transport accepted it.
    async fn send(&self, conversation: ConversationId, text: &str) -> Option<MessageId> {
        match self
            .transport
            .send_text(conversation, text, TextFormat::Plain)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(%conversation, error = %e, "failed to send message");
                None
            }
        }
    }

    async fn reply(&self, conversation: ConversationId, text: &str) {
        self.send(conversation, text).await;
    }

    /// Edit `message` in place, or send a new message when there is nothing
    /// to edit or the edit is rejected.
    async fn edit_or_send(
        &self,
        conversation: ConversationId,
        message: Option<MessageId>,
        text: &str,
    ) {
        if let Some(id) = message {
            match self.transport.edit_text(conversation, id, text).await {
                Ok(()) => return,
                Err(e) => warn!(%conversation, message = %id, error = %e, "edit failed, sending new message"),
            }
        }
        self.reply(conversation, text).await;
    }
}

fn log_fetch_error<S: SwarmEngine + 'static>(
    conversation: ConversationId,
    engine: &FetchEngine<S>,
    err: &FetchError,
    context: &str,
) {
    let fetch_id = engine.id();
    match err.kind() {
        ErrorKind::NoActiveResource => {
            error!(%conversation, %fetch_id, error = %err, "{context}: engine has no active torrent")
        }
        ErrorKind::InvalidInput => info!(%conversation, %fetch_id, error = %err, "{context}"),
        _ => warn!(%conversation, %fetch_id, error = %err, "{context}"),
    }
}
