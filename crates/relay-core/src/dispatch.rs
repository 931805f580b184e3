//! Inbound message dispatch.
//!
//! `Dispatcher` long-polls the transport and routes every message to a
//! per-conversation worker. Each worker drains its own mailbox in order, so
//! messages within one conversation are handled sequentially while distinct
//! conversations run concurrently. A worker with nothing to do for
//! [`WORKER_IDLE_TIMEOUT`] exits and gives up its mailbox; the next message
//! for that conversation starts a fresh one. Session state lives in the
//! store, not the worker, so nothing is lost.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_types::conversation::{ConversationId, InboundMessage};
use relay_types::error::TransportError;

use crate::session::Orchestrator;
use crate::swarm::SwarmEngine;
use crate::transport::ChatTransport;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
pub const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

type Mailboxes = DashMap<ConversationId, mpsc::UnboundedSender<InboundMessage>>;

pub struct Dispatcher<T: ChatTransport, S: SwarmEngine> {
    orchestrator: Arc<Orchestrator<T, S>>,
    /// Sends only happen while holding the entry's shard lock, which is what
    /// lets an idle worker retire without losing a message.
    mailboxes: Arc<Mailboxes>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
}

impl<T, S> Dispatcher<T, S>
where
    T: ChatTransport + 'static,
    S: SwarmEngine + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator<T, S>>, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            mailboxes: Arc::new(DashMap::new()),
            idle_timeout: WORKER_IDLE_TIMEOUT,
            shutdown,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Number of conversations with a live worker.
    pub fn worker_count(&self) -> usize {
        self.mailboxes.len()
    }

    /// Queue `message` on its conversation's worker, spawning one if needed.
    pub fn dispatch(&self, message: InboundMessage) {
        let conversation = message.conversation_id;
        let mailbox = self
            .mailboxes
            .entry(conversation)
            .or_insert_with(|| self.spawn_worker(conversation));

        if mailbox.send(message).is_err() {
            // Worker exited (shutdown in progress); the message is dropped.
            debug!(%conversation, "conversation worker gone, message dropped");
        }
    }

    fn spawn_worker(&self, conversation: ConversationId) -> mpsc::UnboundedSender<InboundMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
        let orchestrator = Arc::clone(&self.orchestrator);
        let mailboxes = Arc::clone(&self.mailboxes);
        let idle_timeout = self.idle_timeout;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            debug!(%conversation, "conversation worker started");
            loop {
                let received = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = tokio::time::timeout(idle_timeout, rx.recv()) => received,
                };
                let message = match received {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(_) => {
                        // The shard lock is held while checking, so no send
                        // can slip in between the check and the removal.
                        if mailboxes.remove_if(&conversation, |_, _| rx.is_empty()).is_some() {
                            break;
                        }
                        continue;
                    }
                };
                orchestrator.handle_message(message).await;
            }
            debug!(%conversation, "conversation worker stopped");
        });

        tx
    }

    /// Poll the transport until shutdown, dispatching every message.
    ///
    /// Poll failures back off exponentially from 1s up to 30s, or for as
    /// long as the transport asks when it reports a rate limit.
    pub async fn run(&self) {
        let transport = Arc::clone(self.orchestrator.transport());
        let mut backoff = INITIAL_BACKOFF;
        info!("listening for messages");

        loop {
            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                polled = transport.poll_updates() => polled,
            };

            match polled {
                Ok(batch) => {
                    backoff = INITIAL_BACKOFF;
                    for message in batch {
                        info!(
                            conversation = %message.conversation_id,
                            sender = %message.sender_label,
                            text = %message.text,
                            "message received"
                        );
                        self.dispatch(message);
                    }
                }
                Err(e) => {
                    let delay = match &e {
                        TransportError::RateLimited {
                            retry_after_secs: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => backoff,
                    };
                    warn!(error = %e, ?delay, "polling for updates failed");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        info!("stopped listening for messages");
    }
}
