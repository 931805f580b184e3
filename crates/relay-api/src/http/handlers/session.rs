//! Session status handlers.
//!
//! Endpoints:
//! - GET /api/v1/sessions      - Every known conversation session
//! - GET /api/v1/sessions/{id} - One session by conversation id

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};

use relay_core::session::SessionSummary;
use relay_types::conversation::ConversationId;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, new_request_id};
use crate::state::AppState;

/// GET /api/v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<SessionSummary>>> {
    let start = Instant::now();
    let sessions = state.store.summaries().await;
    let elapsed = start.elapsed().as_millis() as u64;
    Json(ApiResponse::success(sessions, new_request_id(), elapsed))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionSummary>>, AppError> {
    let start = Instant::now();
    let id = id
        .parse::<i64>()
        .map(ConversationId)
        .map_err(|_| AppError::Validation(format!("'{id}' is not a conversation id")))?;

    let summary = state
        .store
        .summary(id)
        .await
        .ok_or(AppError::SessionNotFound(id))?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(summary, new_request_id(), elapsed)))
}
