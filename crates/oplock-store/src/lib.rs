//! Lock-of-record storage for structural plan operations.
//!
//! Provides the [`LockStore`] trait defining the storage contract every
//! backend implements, plus [`InMemoryStore`] and (behind the default
//! `sqlite` feature) [`SqliteStore`] as first-class backends.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: OperationKind, ResourceKey, LockRecord
//! - [`traits`]: LockStore trait and the RecordUpdate write decision
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL migration setup
//! - [`sqlite`]: SqliteStore implementation

pub mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use traits::{LockStore, RecordUpdate};
pub use types::{LockRecord, OperationKind, ResourceKey, KPI_SEPARATOR};
