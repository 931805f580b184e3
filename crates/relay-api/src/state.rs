//! Application state wiring the adapters into the core.
//!
//! The orchestrator and store are generic over the transport and swarm
//! traits; AppState pins them to the Telegram and Transmission adapters.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use relay_core::delivery::{DeliverySettings, INLINE_MESSAGE_LIMIT};
use relay_core::fetch::FetchSettings;
use relay_core::session::{Orchestrator, OrchestratorSettings, SessionStore};
use relay_infra::config::ResolvedConfig;
use relay_infra::telegram::TelegramTransport;
use relay_infra::transmission::TransmissionSwarm;

/// Concrete type aliases for the core generics pinned to infra implementations.
pub type ConcreteStore = SessionStore<TransmissionSwarm>;
pub type ConcreteOrchestrator = Orchestrator<TelegramTransport, TransmissionSwarm>;

/// Shared state for the run loop and the status API.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub store: Arc<ConcreteStore>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: &ResolvedConfig,
        transport: Arc<TelegramTransport>,
        swarm: Arc<TransmissionSwarm>,
    ) -> Self {
        let store = Arc::new(SessionStore::new(swarm, fetch_settings(config)));
        let orchestrator = Arc::new(Orchestrator::new(
            transport,
            Arc::clone(&store),
            delivery_settings(config),
            orchestrator_settings(config),
        ));

        Self {
            orchestrator,
            store,
            started_at: Utc::now(),
        }
    }
}

pub fn fetch_settings(config: &ResolvedConfig) -> FetchSettings {
    let timing = &config.settings.timing;
    FetchSettings {
        download_root: config.download_dir.clone(),
        resolution_timeout: timing.resolution_timeout(),
        poll_interval: timing.poll_interval(),
        search_depth: config.settings.search_depth,
    }
}

pub fn delivery_settings(config: &ResolvedConfig) -> DeliverySettings {
    DeliverySettings {
        inline_limit: INLINE_MESSAGE_LIMIT,
        max_upload_bytes: config.settings.max_upload_bytes,
        upload_delay: config.settings.timing.upload_delay(),
    }
}

pub fn orchestrator_settings(config: &ResolvedConfig) -> OrchestratorSettings {
    OrchestratorSettings {
        progress_edit_interval: config.settings.timing.progress_edit_interval(),
    }
}
