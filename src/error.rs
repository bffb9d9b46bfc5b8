//! Error taxonomy for the service layer and its HTTP/WebSocket projections.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

/// Errors produced by service layer operations.
///
/// `NotFound` is an expected, common outcome (sessions are created lazily);
/// it only becomes an error event when a command targets a session that was
/// never created. None of these abort the connection that triggered them.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Session key did not resolve.
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed or out-of-range command payload.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// Command arrived too late, e.g. a response after the countdown hit zero.
    #[error("stale command: {0}")]
    Stale(String),
}

impl ServiceError {
    /// Stable machine-readable code carried in outbound error events, so
    /// clients can distinguish rejection kinds without parsing messages.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidCommand(_) => "invalid_command",
            Self::Stale(_) => "stale_command",
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidCommand(format!("validation failed: {err}"))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidCommand(message) | ServiceError::Stale(message) => {
                AppError::BadRequest(message)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
