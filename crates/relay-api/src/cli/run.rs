//! `magnet-relay run`: the long-poll bot loop, with an optional status API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_core::dispatch::Dispatcher;
use relay_infra::config::{
    ResolvedConfig, ensure_dirs, load_bot_token, load_transmission_password, process_env,
};
use relay_infra::telegram::TelegramTransport;
use relay_infra::transmission::TransmissionSwarm;
use relay_types::error::TransportError;

use crate::http;
use crate::state::AppState;

pub async fn run(config: ResolvedConfig, http_addr: Option<SocketAddr>) -> Result<()> {
    let token = load_bot_token(process_env)?;
    let password = load_transmission_password(process_env);
    ensure_dirs(&config).await?;

    let transport = Arc::new(TelegramTransport::new(token, &config.settings.telegram)?);
    match transport.get_me().await {
        Ok(me) => info!(
            bot = me.username.as_deref().unwrap_or("<unnamed>"),
            "authorized on chat account"
        ),
        Err(e @ TransportError::Api { .. }) => {
            return Err(e).context("bot token rejected by the chat API");
        }
        Err(e) => warn!(error = %e, "could not verify the bot token, continuing"),
    }
    let swarm = Arc::new(TransmissionSwarm::new(
        &config.settings.transmission,
        password,
    )?);
    info!(
        download_dir = %config.download_dir.display(),
        transmission = swarm.rpc_url(),
        "magnet-relay starting"
    );

    let state = AppState::new(&config, transport, swarm);
    let shutdown = CancellationToken::new();

    let server = match http_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind status API on {addr}"))?;
            info!(%addr, "status API listening");
            let router = http::router::build_router(state.clone());
            let stop = shutdown.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(stop.cancelled_owned())
                    .await
            }))
        }
        None => None,
    };

    let dispatcher = Dispatcher::new(Arc::clone(&state.orchestrator), shutdown.clone());
    tokio::select! {
        _ = dispatcher.run() => {}
        _ = shutdown_signal() => info!("shutdown requested"),
    }
    shutdown.cancel();

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "status API stopped with an error"),
            Err(e) => warn!(error = %e, "status API task failed"),
        }
    }

    info!(sessions = state.store.len(), "closing active fetches");
    state.store.close_all().await;
    info!("magnet-relay stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
