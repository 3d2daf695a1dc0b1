//! Storage error types for oplock-store.

use thiserror::Error;

/// Errors produced by storage operations.
///
/// Contention is never a storage error: these variants describe a store that
/// cannot answer, not a lock that is held.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite backend reported a failure.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// An operation kind string was neither `add` nor `delete`.
    #[error("invalid operation kind: {0:?}")]
    InvalidOperation(String),

    /// A write did not match the key it was issued for, or a stored row is
    /// malformed.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },

    /// A thread panicked while holding the connection guard.
    #[error("store connection poisoned")]
    ConnectionPoisoned,

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
