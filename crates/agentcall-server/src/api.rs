//! Shared API error type.

use agentcall_calls::CallError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream failure: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        match &err {
            CallError::CallNotFound(_) => ApiError::NotFound(err.to_string()),
            CallError::CallNotAnswered { .. } => ApiError::Conflict(err.to_string()),
            e if e.is_upstream() => {
                tracing::warn!(error = %e, "call operation failed upstream");
                ApiError::BadGateway(err.to_string())
            }
            _ => {
                tracing::error!(error = %err, "call operation failed");
                ApiError::InternalServerError(err.to_string())
            }
        }
    }
}
