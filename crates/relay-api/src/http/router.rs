//! Axum router configuration with middleware.
//!
//! Status routes are under `/api/v1/`; `/health` sits at the root.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sessions", get(handlers::session::list_sessions))
        .route("/sessions/{id}", get(handlers::session::get_session));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness plus a little context.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let uptime = chrono::Utc::now() - state.started_at;
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime.num_seconds(),
        "sessions": state.store.len(),
    }))
}
