//! HTTP handler modules for the lock API.
//!
//! Handlers are thin: they parse requests, delegate to the
//! [`LockCoordinator`](crate::coordinator::LockCoordinator), and shape JSON
//! responses. No lock rules live here.

pub mod debug;
pub mod locks;

use axum::http::HeaderMap;

use crate::error::ApiError;

/// Header carrying the opaque session/operator id that holds locks.
pub const HOLDER_HEADER: &str = "X-Lock-Holder";

/// Extracts the lock holder from the `X-Lock-Holder` HTTP header.
///
/// Returns `ApiError::BadRequest` if the header is missing, blank, or not
/// valid UTF-8.
pub fn extract_holder(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(HOLDER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("{HOLDER_HEADER} header required")))
}
