//! Error types for talking to the lock service.

/// Failure to obtain a lock status from the service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport or body decoding failure.
    #[error("lock service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("lock service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The source could not be reached for another reason.
    #[error("lock service unavailable: {0}")]
    Unavailable(String),
}
