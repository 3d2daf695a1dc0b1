//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the unified error type for all API endpoints. It implements
//! `axum::response::IntoResponse` to produce structured JSON error responses
//! with appropriate HTTP status codes. Lock contention maps to 409 and is not
//! logged as a fault; only store failures are.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use oplock_store::{ResourceKey, StorageError};

use crate::coordinator::{LockDenial, LockError};

/// Structured error detail in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "ALREADY_LOCKED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured details (e.g., who holds a lock).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API errors with HTTP status code mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Entity not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Someone else holds a lock governing the requested key (409).
    #[error("locked: {}", .0.reason.as_deref().unwrap_or("held by another session"))]
    AlreadyLocked(LockDenial),

    /// The caller does not hold the lock it tried to release (409).
    #[error("lock not held: {0}")]
    NotHeld(ResourceKey),

    /// Internal server error (500).
    #[error("internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code, details) = match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),
            ApiError::AlreadyLocked(denial) => (
                StatusCode::CONFLICT,
                "ALREADY_LOCKED",
                Some(serde_json::json!({
                    "lock_reason": denial.reason,
                    "holder": denial.holder,
                    "locked_key": denial.key,
                    "acquired_at": denial.acquired_at,
                })),
            ),
            ApiError::NotHeld(key) => (
                StatusCode::CONFLICT,
                "NOT_HELD",
                serde_json::to_value(&key).ok(),
            ),
            ApiError::InternalError(_) => {
                tracing::error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None)
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": ApiErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::InvalidOperation(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<LockError> for ApiError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Storage(storage) => storage.into(),
            LockError::EmptyHolder => ApiError::BadRequest(err.to_string()),
        }
    }
}
