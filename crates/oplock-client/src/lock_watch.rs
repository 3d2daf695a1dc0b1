//! Polled view of whether an add/delete operation is currently locked.
//!
//! An [`OperationLockWatch`] fetches the status for one [`LockQuery`] when it
//! is spawned, again every [`WatchConfig::interval`], and whenever the view
//! regains focus ([`OperationLockWatch::refresh_on_focus`]). Answers are never
//! cached beyond the latest fetch. Add queries without a KPI are disabled:
//! they report unlocked and never poll.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use oplock_store::OperationKind;

use crate::error::ClientError;
use crate::save_state::SaveError;

/// The scope a watch asks about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockQuery {
    pub operation: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kpi: Option<String>,
    #[serde(rename = "departmentId", skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
}

impl LockQuery {
    /// Blank KPIs are treated as absent.
    pub fn new(operation: OperationKind, kpi: Option<&str>, department_id: Option<i64>) -> Self {
        LockQuery {
            operation,
            kpi: kpi
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            department_id,
        }
    }

    /// Add checks need a KPI to mean anything.
    pub fn is_enabled(&self) -> bool {
        self.operation != OperationKind::Add || self.kpi.is_some()
    }
}

/// Body of a `GET /locks/check` answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteLockStatus {
    pub is_locked: bool,
    #[serde(default)]
    pub lock_reason: Option<String>,
}

/// Where lock status comes from.
#[async_trait]
pub trait LockSource: Send + Sync {
    async fn check(&self, query: &LockQuery) -> Result<RemoteLockStatus, ClientError>;
}

/// How a watch reports a status it could not fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Report locked until a fetch succeeds.
    #[default]
    FailClosed,
    /// Report unlocked and let the server reject the mutation if needed.
    FailOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    pub interval: Duration,
    pub failure_policy: FailurePolicy,
}

impl WatchConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            interval: Self::DEFAULT_INTERVAL,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// What an editing view should show for its operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockView {
    pub is_locked: bool,
    pub lock_reason: Option<String>,
    /// No fetch has completed yet.
    pub is_loading: bool,
    /// The last fetch error, kept even when the failure policy hides it.
    pub error: Option<String>,
}

struct Poller {
    source: Arc<dyn LockSource>,
    query: LockQuery,
    failure_policy: FailurePolicy,
    view: watch::Sender<LockView>,
}

impl Poller {
    async fn fetch(&self) -> LockView {
        let view = match self.source.check(&self.query).await {
            Ok(status) => LockView {
                is_locked: status.is_locked,
                lock_reason: status.lock_reason,
                is_loading: false,
                error: None,
            },
            Err(err) => {
                let error = err.to_string();
                match self.failure_policy {
                    FailurePolicy::FailClosed => {
                        tracing::warn!(query = ?self.query, %error, "lock status unavailable; reporting locked");
                        LockView {
                            is_locked: true,
                            lock_reason: Some(format!("lock status unavailable: {error}")),
                            is_loading: false,
                            error: Some(error),
                        }
                    }
                    FailurePolicy::FailOpen => {
                        tracing::warn!(query = ?self.query, %error, "lock status unavailable; reporting unlocked");
                        LockView {
                            is_locked: false,
                            lock_reason: None,
                            is_loading: false,
                            error: Some(error),
                        }
                    }
                }
            }
        };
        self.view.send_replace(view.clone());
        view
    }
}

/// Keeps a [`LockView`] current for one query. Polling stops on drop.
pub struct OperationLockWatch {
    poller: Arc<Poller>,
    focus: Arc<Notify>,
    enabled: bool,
    task: Option<JoinHandle<()>>,
}

impl OperationLockWatch {
    /// Starts watching `query`. Must be called within a tokio runtime.
    pub fn spawn(source: Arc<dyn LockSource>, query: LockQuery, config: WatchConfig) -> Self {
        let enabled = query.is_enabled();
        let (view, _) = watch::channel(LockView {
            is_loading: enabled,
            ..LockView::default()
        });
        let poller = Arc::new(Poller {
            source,
            query,
            failure_policy: config.failure_policy,
            view,
        });
        let focus = Arc::new(Notify::new());

        let task = enabled.then(|| {
            let poller = Arc::clone(&poller);
            let focus = Arc::clone(&focus);
            let interval = config.interval;
            tokio::spawn(async move {
                loop {
                    poller.fetch().await;
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = focus.notified() => {}
                    }
                }
            })
        });
        if !enabled {
            tracing::debug!(query = ?poller.query, "lock watch disabled: add check without kpi");
        }

        OperationLockWatch {
            poller,
            focus,
            enabled,
            task,
        }
    }

    pub fn query(&self) -> &LockQuery {
        &self.poller.query
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The latest view.
    pub fn view(&self) -> LockView {
        self.poller.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LockView> {
        self.poller.view.subscribe()
    }

    /// The view regained focus; re-fetch now instead of at the next tick.
    pub fn refresh_on_focus(&self) {
        if self.enabled {
            self.focus.notify_one();
        }
    }

    /// Fetches inline and returns the fresh view.
    pub async fn refresh(&self) -> LockView {
        if !self.enabled {
            return self.view();
        }
        self.poller.fetch().await
    }

    /// Turns the current view into a go/no-go for a mutation.
    ///
    /// Fails with `locked: <reason>` while locked, and under
    /// [`FailurePolicy::FailClosed`] while the first fetch is outstanding.
    pub fn gate(&self) -> Result<LockView, SaveError> {
        let view = self.view();
        if view.is_locked {
            let reason = view.lock_reason.as_deref().unwrap_or("operation is locked");
            return Err(SaveError::new(format!("locked: {reason}")));
        }
        if view.is_loading && self.poller.failure_policy == FailurePolicy::FailClosed {
            return Err(SaveError::new("locked: lock status not loaded yet"));
        }
        Ok(view)
    }
}

impl Drop for OperationLockWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
