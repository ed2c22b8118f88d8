//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`SignoffError`] classes to HTTP status codes and returns a JSON body
//! with a machine-readable code and a message. Server-side failures are
//! logged and redacted.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use signoff_core::SignoffError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (422).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No actor identity on a write request (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Capability or assignment check failed (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Illegal transition from the current status or stage (409).
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            Self::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<SignoffError> for AppError {
    fn from(err: SignoffError) -> Self {
        match err {
            SignoffError::Validation(m) => Self::Validation(m),
            SignoffError::NotFound(m) => Self::NotFound(m),
            SignoffError::PermissionDenied(m) => Self::Forbidden(m),
            SignoffError::InvalidStateTransition(m) => Self::InvalidTransition(m),
            SignoffError::Conflict(m) => Self::Conflict(m),
            other @ (SignoffError::Journal(_)
            | SignoffError::Integrity(_)
            | SignoffError::Canonicalization(_)) => Self::Internal(other.to_string()),
        }
    }
}
