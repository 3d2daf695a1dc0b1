//! Client side of operation locking for dashboard editing views.
//!
//! - [`SaveSession`] serializes save attempts and tracks unsaved changes.
//! - [`OperationLockWatch`] keeps a polled view of whether an add/delete is
//!   currently blocked, read through a [`LockSource`] such as
//!   [`HttpLockSource`].

pub mod error;
pub mod http;
pub mod lock_watch;
pub mod save_state;

pub use error::ClientError;
pub use http::HttpLockSource;
pub use lock_watch::{
    FailurePolicy, LockQuery, LockSource, LockView, OperationLockWatch, RemoteLockStatus,
    WatchConfig,
};
pub use oplock_store::OperationKind;
pub use save_state::{SaveError, SaveOptions, SaveSession, SaveSnapshot, SaveState};
