//! Save state machine for an editing view.
//!
//! A [`SaveSession`] moves through `idle → saving → {success, error}`. Success
//! reverts to idle on its own after [`SaveOptions::success_display`]; error
//! stays until [`SaveSession::retry`], [`SaveSession::mark_saved`] or
//! [`SaveSession::reset`]. The unsaved-changes flag is tracked independently
//! of the state.
//!
//! At most one save is in flight: calling [`SaveSession::save`] while saving
//! does nothing. A save that completes after `reset`/`mark_saved` has been
//! called is ignored, but it still blocks new saves until it returns.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::ClientError;

/// Where a [`SaveSession`] is in its save cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SaveState {
    #[default]
    Idle,
    Saving,
    Success,
    Error,
}

impl SaveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveState::Idle => "idle",
            SaveState::Saving => "saving",
            SaveState::Success => "success",
            SaveState::Error => "error",
        }
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a save failed. Cloneable so it can sit in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SaveError {
    message: String,
}

impl SaveError {
    pub fn new(message: impl Into<String>) -> Self {
        SaveError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for SaveError {
    fn from(message: &str) -> Self {
        SaveError::new(message)
    }
}

impl From<String> for SaveError {
    fn from(message: String) -> Self {
        SaveError::new(message)
    }
}

impl From<ClientError> for SaveError {
    fn from(err: ClientError) -> Self {
        SaveError::new(err.to_string())
    }
}

/// Observable state of a [`SaveSession`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSnapshot {
    pub state: SaveState,
    pub has_unsaved_changes: bool,
    pub error: Option<SaveError>,
}

type SaveFuture = Pin<Box<dyn Future<Output = Result<(), SaveError>> + Send>>;
type SaveFn = Arc<dyn Fn() -> SaveFuture + Send + Sync>;

/// Callbacks and timings for a [`SaveSession`].
#[derive(Clone)]
pub struct SaveOptions {
    on_success: Option<Arc<dyn Fn() + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&SaveError) + Send + Sync>>,
    success_display: Duration,
    confirm_before_close: bool,
}

impl SaveOptions {
    pub const DEFAULT_SUCCESS_DISPLAY: Duration = Duration::from_secs(2);

    pub fn new() -> Self {
        SaveOptions {
            on_success: None,
            on_error: None,
            success_display: Self::DEFAULT_SUCCESS_DISPLAY,
            confirm_before_close: false,
        }
    }

    /// Called after every successful save.
    pub fn on_success(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Called after every failed save with the captured error.
    pub fn on_error(mut self, callback: impl Fn(&SaveError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// How long `success` is shown before reverting to `idle`.
    pub fn success_display(mut self, duration: Duration) -> Self {
        self.success_display = duration;
        self
    }

    /// Ask before closing the view while changes are unsaved.
    pub fn confirm_before_close(mut self, confirm: bool) -> Self {
        self.confirm_before_close = confirm;
        self
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOptions")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("success_display", &self.success_display)
            .field("confirm_before_close", &self.confirm_before_close)
            .finish()
    }
}

struct Control {
    /// The last save attempted, kept for `retry`.
    pending: Option<SaveFn>,
    /// Bumped by every save start, `mark_saved` and `reset`; completions and
    /// success reverts only apply while it is unchanged.
    generation: u64,
    /// A save function is running. Survives `reset`/`mark_saved`, which only
    /// hide its outcome.
    in_flight: bool,
}

/// Clears `Control::in_flight` when the running save function finishes or
/// the `run` future is dropped.
struct InFlightGuard<'a> {
    inner: &'a Inner,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.control().in_flight = false;
    }
}

struct Inner {
    snapshot: watch::Sender<SaveSnapshot>,
    control: Mutex<Control>,
    options: SaveOptions,
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Save state for one editing view.
///
/// Cheap to clone; clones share the same state. Dropping the last clone
/// discards it.
#[derive(Clone)]
pub struct SaveSession {
    inner: Arc<Inner>,
}

impl SaveSession {
    pub fn new(options: SaveOptions) -> Self {
        let (snapshot, _) = watch::channel(SaveSnapshot::default());
        SaveSession {
            inner: Arc::new(Inner {
                snapshot,
                control: Mutex::new(Control {
                    pending: None,
                    generation: 0,
                    in_flight: false,
                }),
                options,
            }),
        }
    }

    pub fn state(&self) -> SaveState {
        self.inner.snapshot.borrow().state
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.snapshot.borrow().has_unsaved_changes
    }

    pub fn error(&self) -> Option<SaveError> {
        self.inner.snapshot.borrow().error.clone()
    }

    pub fn snapshot(&self) -> SaveSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Receives every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<SaveSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Whether closing the view should ask for confirmation first.
    pub fn should_confirm_close(&self) -> bool {
        self.inner.options.confirm_before_close && self.has_unsaved_changes()
    }

    /// Runs `save_fn` unless a save is already in flight.
    ///
    /// Never fails: the outcome is recorded in the session state. Must run
    /// inside a tokio runtime (the success revert is a spawned timer).
    pub async fn save<F, Fut, E>(&self, save_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<SaveError>,
    {
        let save_fn: SaveFn = Arc::new(move || {
            let fut = save_fn();
            Box::pin(async move { fut.await.map_err(Into::into) })
        });
        self.run(save_fn).await;
    }

    /// Re-runs the last attempted save, if any.
    pub async fn retry(&self) {
        let pending = self.inner.control().pending.clone();
        match pending {
            Some(save_fn) => self.run(save_fn).await,
            None => tracing::debug!("retry requested with no previous save"),
        }
    }

    pub fn mark_unsaved(&self) {
        self.inner.snapshot.send_if_modified(|snapshot| {
            let changed = !snapshot.has_unsaved_changes;
            snapshot.has_unsaved_changes = true;
            changed
        });
    }

    /// Records that the view's changes are persisted by other means.
    ///
    /// Keeps the retry function; an in-flight save's completion is ignored.
    pub fn mark_saved(&self) {
        let mut control = self.inner.control();
        control.generation += 1;
        self.inner.snapshot.send_modify(|snapshot| {
            snapshot.state = SaveState::Idle;
            snapshot.has_unsaved_changes = false;
            snapshot.error = None;
        });
    }

    /// Returns to the initial state and forgets the retry function.
    pub fn reset(&self) {
        let mut control = self.inner.control();
        control.generation += 1;
        control.pending = None;
        self.inner.snapshot.send_replace(SaveSnapshot::default());
    }

    async fn run(&self, save_fn: SaveFn) {
        let generation = {
            let mut control = self.inner.control();
            if control.in_flight {
                tracing::debug!("save ignored: another save is in flight");
                return;
            }
            control.pending = Some(Arc::clone(&save_fn));
            control.generation += 1;
            control.in_flight = true;
            self.inner.snapshot.send_modify(|snapshot| {
                snapshot.state = SaveState::Saving;
                snapshot.error = None;
            });
            control.generation
        };

        let guard = InFlightGuard { inner: &self.inner };
        let result = save_fn().await;
        drop(guard);

        {
            let control = self.inner.control();
            if control.generation != generation {
                tracing::debug!("save completed after the session moved on; result ignored");
                return;
            }
            match &result {
                Ok(()) => {
                    self.inner.snapshot.send_modify(|snapshot| {
                        snapshot.state = SaveState::Success;
                        snapshot.has_unsaved_changes = false;
                    });
                    self.schedule_revert(generation);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "save failed");
                    self.inner.snapshot.send_modify(|snapshot| {
                        snapshot.state = SaveState::Error;
                        snapshot.error = Some(err.clone());
                    });
                }
            }
        }

        match result {
            Ok(()) => {
                if let Some(callback) = &self.inner.options.on_success {
                    callback();
                }
            }
            Err(err) => {
                if let Some(callback) = &self.inner.options.on_error {
                    callback(&err);
                }
            }
        }
    }

    fn schedule_revert(&self, generation: u64) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = self.inner.options.success_display;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let control = inner.control();
            if control.generation == generation {
                inner.snapshot.send_if_modified(|snapshot| {
                    if snapshot.state != SaveState::Success {
                        return false;
                    }
                    snapshot.state = SaveState::Idle;
                    true
                });
            }
        });
    }
}

impl Default for SaveSession {
    fn default() -> Self {
        Self::new(SaveOptions::default())
    }
}

impl fmt::Debug for SaveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveSession")
            .field("snapshot", &*self.inner.snapshot.borrow())
            .field("options", &self.inner.options)
            .finish()
    }
}
