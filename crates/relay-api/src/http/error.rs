//! Application error type mapping to HTTP status codes and envelope format.

use axum::response::{IntoResponse, Response};

use relay_types::conversation::ConversationId;

use super::response::{ApiResponse, new_request_id};

#[derive(Debug)]
pub enum AppError {
    SessionNotFound(ConversationId),
    Validation(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::SessionNotFound(id) => format!("No session for conversation {id}"),
            AppError::Validation(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiResponse::error(self.code(), &self.message(), new_request_id()).into_response()
    }
}
