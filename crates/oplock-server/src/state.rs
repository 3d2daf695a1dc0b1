//! Application state shared across handlers.
//!
//! [`AppState`] holds the [`LockCoordinator`] behind an `Arc`. The coordinator
//! needs no outer mutex: every read-modify-write goes through
//! `LockStore::update`, which is atomic per key in both store backends.

use std::sync::Arc;

use oplock_store::{InMemoryStore, LockStore, SqliteStore};

use crate::config::ServerConfig;
use crate::coordinator::LockCoordinator;
use crate::error::ApiError;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<LockCoordinator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Builds state for `config`: a SQLite store when `db_path` is set,
    /// otherwise an in-memory one.
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let store: Arc<dyn LockStore> = match &config.db_path {
            Some(path) => {
                tracing::info!(path = %path, "using sqlite lock store");
                Arc::new(SqliteStore::new(path)?)
            }
            None => {
                tracing::warn!("OPLOCK_DB_PATH not set; locks will not survive a restart");
                Arc::new(InMemoryStore::new())
            }
        };
        Ok(Self::with_store(store, config.clone()))
    }

    /// Creates state over an in-memory store with default configuration
    /// (for testing).
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()), ServerConfig::default())
    }

    /// Creates state over an arbitrary store.
    pub fn with_store(store: Arc<dyn LockStore>, config: ServerConfig) -> Self {
        AppState {
            coordinator: Arc::new(LockCoordinator::new(store, config.staleness)),
            config: Arc::new(config),
        }
    }
}
