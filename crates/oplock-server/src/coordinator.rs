//! Operation lock coordinator for structural plan edits.
//!
//! [`LockCoordinator`] is the single arbiter of whether an add/delete on a
//! [`ResourceKey`] may proceed. It layers three rules over a [`LockStore`]:
//! staleness (old records read as unlocked without being purged), specificity
//! (the narrowest active lock governs a query) and holder ownership (only the
//! holder may release). Contention is an outcome, not an error.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use oplock_store::{LockRecord, LockStore, RecordUpdate, ResourceKey, StorageError};

/// When a stored lock stops counting as held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Records whose `acquired_at` is at least this old read as unlocked.
    pub threshold: Duration,
    /// Holder-less administrative blocks never go stale when set.
    pub exempt_administrative: bool,
}

impl StalenessPolicy {
    pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(5 * 60);

    pub fn new(threshold: Duration) -> Self {
        StalenessPolicy {
            threshold,
            exempt_administrative: false,
        }
    }

    pub fn is_stale(&self, record: &LockRecord, now: DateTime<Utc>) -> bool {
        if self.exempt_administrative && record.is_administrative() {
            return false;
        }
        // Thresholds beyond chrono's range never expire.
        let Ok(threshold) = chrono::Duration::from_std(self.threshold) else {
            return false;
        };
        now.signed_duration_since(record.acquired_at) >= threshold
    }

    /// Locked and not stale.
    pub fn is_active(&self, record: &LockRecord, now: DateTime<Utc>) -> bool {
        record.is_locked && !self.is_stale(record, now)
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

/// Result of a lock check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub is_locked: bool,
    pub reason: Option<String>,
    /// The record that decided the answer, when locked.
    pub governing: Option<LockRecord>,
}

impl LockStatus {
    pub fn unlocked() -> Self {
        LockStatus {
            is_locked: false,
            reason: None,
            governing: None,
        }
    }

    fn governed_by(record: LockRecord) -> Self {
        LockStatus {
            is_locked: true,
            reason: record.reason.clone(),
            governing: Some(record),
        }
    }
}

/// Who is in the way of an acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockDenial {
    pub key: ResourceKey,
    pub holder: Option<String>,
    pub reason: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

impl From<&LockRecord> for LockDenial {
    fn from(record: &LockRecord) -> Self {
        LockDenial {
            key: record.key.clone(),
            holder: record.holder.clone(),
            reason: record.reason.clone(),
            acquired_at: record.acquired_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller holds the lock; carries the stored record.
    Acquired(LockRecord),
    AlreadyLocked(LockDenial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    NotHeld,
}

/// A stored record together with how the coordinator currently reads it.
#[derive(Debug, Clone)]
pub struct InspectedRecord {
    pub record: LockRecord,
    pub is_stale: bool,
}

/// Errors from lock operations. Contention is reported through
/// [`AcquireOutcome`] / [`ReleaseOutcome`], never here.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock store could not answer.
    #[error("lock store failure: {0}")]
    Storage(#[from] StorageError),

    /// Acquire/release was called without a holder identity.
    #[error("lock holder must not be empty")]
    EmptyHolder,
}

/// Picks the most specific record; ties go to the most recent acquisition.
fn most_specific(records: impl IntoIterator<Item = LockRecord>) -> Option<LockRecord> {
    records.into_iter().min_by(|a, b| {
        a.key
            .specificity()
            .cmp(&b.key.specificity())
            .then_with(|| b.acquired_at.cmp(&a.acquired_at))
    })
}

/// Arbiter for add/delete locks over an injected [`LockStore`].
pub struct LockCoordinator {
    store: Arc<dyn LockStore>,
    policy: StalenessPolicy,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn LockStore>, policy: StalenessPolicy) -> Self {
        LockCoordinator { store, policy }
    }

    pub fn policy(&self) -> StalenessPolicy {
        self.policy
    }

    /// Keys that may govern a check on `key`: its own governing chain plus
    /// the chain of every KPI in a multi-KPI key, deduplicated.
    fn candidate_keys(key: &ResourceKey) -> Vec<ResourceKey> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let chains = std::iter::once(key.clone())
            .chain(key.split_kpis())
            .flat_map(|k| k.governing_keys());
        for candidate in chains {
            if seen.insert(candidate.clone()) {
                keys.push(candidate);
            }
        }
        keys
    }

    /// Reports whether an operation on `key` is currently blocked.
    ///
    /// Read-only. Only active records are considered; the most specific one
    /// decides.
    pub fn check_lock(&self, key: &ResourceKey) -> Result<LockStatus, LockError> {
        let now = Utc::now();
        let records = self.store.get_many(&Self::candidate_keys(key))?;
        let governing = most_specific(
            records
                .into_iter()
                .filter(|record| self.policy.is_active(record, now)),
        );
        Ok(governing.map_or_else(LockStatus::unlocked, LockStatus::governed_by))
    }

    /// Takes the lock on `key` for `holder`, or reports who holds it.
    ///
    /// Re-acquiring an active lock already held by `holder` is a no-op
    /// success. Broader locks held by someone else (including administrative
    /// blocks) deny the acquisition too.
    ///
    /// Only the exact key is checked and written atomically. The broader-lock
    /// check is a separate read, and narrower locks are not consulted at all,
    /// so a concurrent acquire of `(op, None, 3)` and `(op, "5.4.1", 3)` can
    /// both succeed. Callers needing exclusion across a hierarchy must lock
    /// the same key.
    pub fn acquire(
        &self,
        key: &ResourceKey,
        holder: &str,
        reason: Option<String>,
    ) -> Result<AcquireOutcome, LockError> {
        if holder.trim().is_empty() {
            return Err(LockError::EmptyHolder);
        }
        let now = Utc::now();

        let broader: Vec<ResourceKey> = key.governing_keys().into_iter().skip(1).collect();
        let blocking = most_specific(
            self.store
                .get_many(&broader)?
                .into_iter()
                .filter(|record| self.policy.is_active(record, now) && !record.is_held_by(holder)),
        );
        if let Some(record) = blocking {
            tracing::debug!(key = %key, holder, blocked_by = %record.key, "acquire denied by broader lock");
            return Ok(AcquireOutcome::AlreadyLocked(LockDenial::from(&record)));
        }

        let policy = self.policy;
        let mut outcome = None;
        self.store.update(key, &mut |current| match current {
            Some(record) if policy.is_active(record, now) => {
                outcome = Some(if record.is_held_by(holder) {
                    AcquireOutcome::Acquired(record.clone())
                } else {
                    AcquireOutcome::AlreadyLocked(LockDenial::from(record))
                });
                RecordUpdate::Keep
            }
            _ => {
                let record = LockRecord::held(key.clone(), holder, reason.clone(), now);
                outcome = Some(AcquireOutcome::Acquired(record.clone()));
                RecordUpdate::Put(record)
            }
        })?;

        let outcome = outcome.ok_or_else(|| StorageError::IntegrityError {
            reason: format!("store skipped the acquire decision for {key}"),
        })?;
        match &outcome {
            AcquireOutcome::Acquired(record) => {
                tracing::info!(key = %key, holder, acquired_at = %record.acquired_at, "lock acquired");
            }
            AcquireOutcome::AlreadyLocked(denial) => {
                tracing::debug!(key = %key, holder, held_by = ?denial.holder, "acquire denied");
            }
        }
        Ok(outcome)
    }

    /// Releases the lock on `key` if `holder` holds it and it is still active.
    pub fn release(&self, key: &ResourceKey, holder: &str) -> Result<ReleaseOutcome, LockError> {
        if holder.trim().is_empty() {
            return Err(LockError::EmptyHolder);
        }
        let now = Utc::now();
        let policy = self.policy;

        let mut released = false;
        self.store.update(key, &mut |current| match current {
            Some(record) if record.is_held_by(holder) && policy.is_active(record, now) => {
                released = true;
                RecordUpdate::Remove
            }
            _ => RecordUpdate::Keep,
        })?;

        if released {
            tracing::info!(key = %key, holder, "lock released");
            Ok(ReleaseOutcome::Released)
        } else {
            tracing::debug!(key = %key, holder, "release refused: not held");
            Ok(ReleaseOutcome::NotHeld)
        }
    }

    /// Places a holder-less administrative block on `key`, replacing any
    /// existing record.
    pub fn block(&self, key: &ResourceKey, reason: Option<String>) -> Result<LockRecord, LockError> {
        let record = LockRecord::administrative(key.clone(), reason, Utc::now());
        self.store
            .update(key, &mut |_| RecordUpdate::Put(record.clone()))?;
        tracing::info!(key = %key, reason = ?record.reason, "administrative block placed");
        Ok(record)
    }

    /// Removes whatever record sits at `key`, regardless of holder.
    ///
    /// Returns whether a record existed.
    pub fn clear(&self, key: &ResourceKey) -> Result<bool, LockError> {
        let mut existed = false;
        self.store.update(key, &mut |current| {
            existed = current.is_some();
            RecordUpdate::Remove
        })?;
        if existed {
            tracing::info!(key = %key, "lock record cleared");
        }
        Ok(existed)
    }

    /// Removes every record held by `holder`, stale or not.
    ///
    /// Returns the keys that were removed.
    pub fn release_all(&self, holder: &str) -> Result<Vec<ResourceKey>, LockError> {
        let held: Vec<ResourceKey> = self
            .store
            .list()?
            .into_iter()
            .filter(|record| record.is_held_by(holder))
            .map(|record| record.key)
            .collect();

        let mut released = Vec::new();
        for key in held {
            let mut removed = false;
            self.store.update(&key, &mut |current| match current {
                Some(record) if record.is_held_by(holder) => {
                    removed = true;
                    RecordUpdate::Remove
                }
                _ => RecordUpdate::Keep,
            })?;
            if removed {
                released.push(key);
            }
        }

        if !released.is_empty() {
            tracing::info!(holder, count = released.len(), "released all locks for holder");
        }
        Ok(released)
    }

    /// Every stored record, unfiltered, with its staleness as of now.
    pub fn inspect(&self) -> Result<Vec<InspectedRecord>, LockError> {
        let now = Utc::now();
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|record| InspectedRecord {
                is_stale: self.policy.is_stale(&record, now),
                record,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use oplock_store::{InMemoryStore, OperationKind};

    use super::*;

    fn setup() -> (Arc<InMemoryStore>, LockCoordinator) {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = LockCoordinator::new(store.clone(), StalenessPolicy::default());
        (store, coordinator)
    }

    fn key(kpi: Option<&str>, dept: Option<i64>) -> ResourceKey {
        ResourceKey::new(OperationKind::Add, kpi, dept)
    }

    fn put(store: &InMemoryStore, record: LockRecord) {
        let key = record.key.clone();
        store
            .update(&key, &mut |_| RecordUpdate::Put(record.clone()))
            .unwrap();
    }

    fn minutes_ago(minutes: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(minutes)
    }

    #[test]
    fn test_scenario_acquire_check_contend() {
        let (_, coordinator) = setup();
        let k = ResourceKey::new(OperationKind::Delete, Some("5.4.1"), Some(3));

        let outcome = coordinator
            .acquire(&k, "userA", Some("editing".to_string()))
            .unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired(_)));

        let status = coordinator.check_lock(&k).unwrap();
        assert!(status.is_locked);
        assert_eq!(status.reason.as_deref(), Some("editing"));

        match coordinator.acquire(&k, "userB", None).unwrap() {
            AcquireOutcome::AlreadyLocked(denial) => {
                assert_eq!(denial.holder.as_deref(), Some("userA"));
                assert_eq!(denial.reason.as_deref(), Some("editing"));
            }
            other => panic!("expected AlreadyLocked, got {other:?}"),
        }
    }

    #[test]
    fn test_reacquire_by_same_holder_is_noop() {
        let (store, coordinator) = setup();
        let k = key(Some("1.1"), Some(2));

        let first = match coordinator.acquire(&k, "userA", Some("first".into())).unwrap() {
            AcquireOutcome::Acquired(record) => record,
            other => panic!("unexpected {other:?}"),
        };
        let second = match coordinator.acquire(&k, "userA", Some("second".into())).unwrap() {
            AcquireOutcome::Acquired(record) => record,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(first, second);
        assert_eq!(store.get(&k).unwrap().unwrap().reason.as_deref(), Some("first"));
    }

    #[test]
    fn test_release_then_other_holder_acquires() {
        let (_, coordinator) = setup();
        let k = key(Some("1.1"), None);

        coordinator.acquire(&k, "userA", None).unwrap();
        assert_eq!(coordinator.release(&k, "userA").unwrap(), ReleaseOutcome::Released);
        assert!(!coordinator.check_lock(&k).unwrap().is_locked);
        assert!(matches!(
            coordinator.acquire(&k, "userB", None).unwrap(),
            AcquireOutcome::Acquired(_)
        ));
    }

    #[test]
    fn test_release_by_non_holder_is_refused() {
        let (_, coordinator) = setup();
        let k = key(None, Some(4));

        assert_eq!(coordinator.release(&k, "userA").unwrap(), ReleaseOutcome::NotHeld);
        coordinator.acquire(&k, "userA", None).unwrap();
        assert_eq!(coordinator.release(&k, "userB").unwrap(), ReleaseOutcome::NotHeld);
        assert!(coordinator.check_lock(&k).unwrap().is_locked);
    }

    #[test]
    fn test_stale_record_reads_unlocked_but_is_not_purged() {
        let (store, coordinator) = setup();
        let k = key(Some("1.1"), Some(1));
        put(&store, LockRecord::held(k.clone(), "crashed", None, minutes_ago(6)));

        assert!(!coordinator.check_lock(&k).unwrap().is_locked);
        assert!(store.get(&k).unwrap().is_some());

        let inspected = coordinator.inspect().unwrap();
        assert_eq!(inspected.len(), 1);
        assert!(inspected[0].is_stale);
    }

    #[test]
    fn test_stale_lock_can_be_taken_over() {
        let (store, coordinator) = setup();
        let k = key(Some("1.1"), Some(1));
        put(&store, LockRecord::held(k.clone(), "crashed", None, minutes_ago(10)));

        assert!(matches!(
            coordinator.acquire(&k, "userB", None).unwrap(),
            AcquireOutcome::Acquired(_)
        ));
        assert!(store.get(&k).unwrap().unwrap().is_held_by("userB"));
        // The original holder no longer holds anything it can release.
        assert_eq!(coordinator.release(&k, "crashed").unwrap(), ReleaseOutcome::NotHeld);
    }

    #[test]
    fn test_custom_threshold() {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = LockCoordinator::new(
            store.clone(),
            StalenessPolicy::new(Duration::from_secs(30 * 60)),
        );
        let k = key(None, None);
        put(&store, LockRecord::held(k.clone(), "userA", None, minutes_ago(10)));
        assert!(coordinator.check_lock(&k).unwrap().is_locked);
    }

    #[test]
    fn test_exempt_administrative_blocks_never_expire() {
        let store = Arc::new(InMemoryStore::new());
        let policy = StalenessPolicy {
            exempt_administrative: true,
            ..StalenessPolicy::default()
        };
        let coordinator = LockCoordinator::new(store.clone(), policy);
        let k = key(None, Some(9));
        put(&store, LockRecord::administrative(k.clone(), Some("freeze".into()), minutes_ago(60)));

        let status = coordinator.check_lock(&k).unwrap();
        assert!(status.is_locked);
        assert_eq!(status.reason.as_deref(), Some("freeze"));
    }

    #[test]
    fn test_department_lock_beats_global_lock() {
        let (_, coordinator) = setup();
        coordinator
            .block(&key(None, None), Some("global freeze".into()))
            .unwrap();
        coordinator
            .block(&key(None, Some(7)), Some("department 7 review".into()))
            .unwrap();

        let status = coordinator.check_lock(&key(None, Some(7))).unwrap();
        assert_eq!(status.reason.as_deref(), Some("department 7 review"));

        let other = coordinator.check_lock(&key(None, Some(8))).unwrap();
        assert_eq!(other.reason.as_deref(), Some("global freeze"));
    }

    #[test]
    fn test_full_specificity_order() {
        let (_, coordinator) = setup();
        let exact = key(Some("5.4.1"), Some(3));
        coordinator.block(&key(None, None), Some("global".into())).unwrap();
        coordinator.block(&key(None, Some(3)), Some("dept".into())).unwrap();
        coordinator.block(&key(Some("5.4.1"), None), Some("kpi".into())).unwrap();
        assert_eq!(coordinator.check_lock(&exact).unwrap().reason.as_deref(), Some("kpi"));

        coordinator.block(&exact, Some("exact".into())).unwrap();
        assert_eq!(coordinator.check_lock(&exact).unwrap().reason.as_deref(), Some("exact"));

        coordinator.clear(&exact).unwrap();
        coordinator.clear(&key(Some("5.4.1"), None)).unwrap();
        assert_eq!(coordinator.check_lock(&exact).unwrap().reason.as_deref(), Some("dept"));
    }

    #[test]
    fn test_stale_specific_lock_falls_back_to_broader() {
        let (store, coordinator) = setup();
        coordinator.block(&key(None, None), Some("global".into())).unwrap();
        put(
            &store,
            LockRecord::held(key(None, Some(7)), "userA", Some("dept".into()), minutes_ago(6)),
        );
        assert_eq!(
            coordinator.check_lock(&key(None, Some(7))).unwrap().reason.as_deref(),
            Some("global")
        );
    }

    #[test]
    fn test_operation_kinds_are_independent() {
        let (_, coordinator) = setup();
        coordinator
            .block(&ResourceKey::global(OperationKind::Delete), None)
            .unwrap();
        assert!(!coordinator.check_lock(&key(Some("1"), Some(1))).unwrap().is_locked);
        assert!(coordinator
            .check_lock(&ResourceKey::new(OperationKind::Delete, Some("1"), Some(1)))
            .unwrap()
            .is_locked);
    }

    #[test]
    fn test_multi_kpi_check_matches_any_listed_kpi() {
        let (_, coordinator) = setup();
        coordinator
            .acquire(&key(Some("5.4.2"), Some(3)), "userA", Some("editing 5.4.2".into()))
            .unwrap();

        let status = coordinator
            .check_lock(&key(Some("5.4.1||5.4.2"), Some(3)))
            .unwrap();
        assert!(status.is_locked);
        assert_eq!(status.reason.as_deref(), Some("editing 5.4.2"));

        assert!(!coordinator
            .check_lock(&key(Some("5.4.1||5.4.3"), Some(3)))
            .unwrap()
            .is_locked);
    }

    #[test]
    fn test_ties_prefer_most_recent_acquisition() {
        let (store, coordinator) = setup();
        put(
            &store,
            LockRecord::held(key(Some("a"), Some(1)), "userA", Some("older".into()), minutes_ago(3)),
        );
        put(
            &store,
            LockRecord::held(key(Some("b"), Some(1)), "userB", Some("newer".into()), minutes_ago(1)),
        );
        let status = coordinator.check_lock(&key(Some("a||b"), Some(1))).unwrap();
        assert_eq!(status.reason.as_deref(), Some("newer"));
    }

    #[test]
    fn test_broader_lock_denies_acquire() {
        let (_, coordinator) = setup();
        coordinator
            .acquire(&key(None, Some(3)), "userA", Some("restructuring".into()))
            .unwrap();

        match coordinator.acquire(&key(Some("5.4.1"), Some(3)), "userB", None).unwrap() {
            AcquireOutcome::AlreadyLocked(denial) => {
                assert_eq!(denial.key, key(None, Some(3)));
                assert_eq!(denial.reason.as_deref(), Some("restructuring"));
            }
            other => panic!("expected AlreadyLocked, got {other:?}"),
        }

        // The holder of the broader lock may still take narrower ones.
        assert!(matches!(
            coordinator.acquire(&key(Some("5.4.1"), Some(3)), "userA", None).unwrap(),
            AcquireOutcome::Acquired(_)
        ));
    }

    #[test]
    fn test_administrative_block_denies_everyone() {
        let (_, coordinator) = setup();
        let k = key(Some("1.1"), None);
        coordinator.block(&k, Some("quarter closed".into())).unwrap();

        match coordinator.acquire(&k, "userA", None).unwrap() {
            AcquireOutcome::AlreadyLocked(denial) => {
                assert!(denial.holder.is_none());
                assert_eq!(denial.reason.as_deref(), Some("quarter closed"));
            }
            other => panic!("expected AlreadyLocked, got {other:?}"),
        }
        assert_eq!(coordinator.release(&k, "userA").unwrap(), ReleaseOutcome::NotHeld);
        assert!(coordinator.clear(&k).unwrap());
        assert!(!coordinator.clear(&k).unwrap());
        assert!(!coordinator.check_lock(&k).unwrap().is_locked);
    }

    #[test]
    fn test_release_all_only_touches_holder() {
        let (store, coordinator) = setup();
        coordinator.acquire(&key(Some("1"), None), "userA", None).unwrap();
        coordinator.acquire(&key(Some("2"), None), "userA", None).unwrap();
        coordinator.acquire(&key(Some("3"), None), "userB", None).unwrap();
        put(&store, LockRecord::held(key(Some("4"), None), "userA", None, minutes_ago(30)));

        let mut released = coordinator.release_all("userA").unwrap();
        released.sort_by_key(|k| k.storage_key());
        assert_eq!(
            released,
            vec![key(Some("1"), None), key(Some("2"), None), key(Some("4"), None)]
        );
        assert_eq!(store.len(), 1);
        assert!(store.get(&key(Some("3"), None)).unwrap().is_some());
    }

    #[test]
    fn test_empty_holder_is_rejected() {
        let (_, coordinator) = setup();
        assert!(matches!(
            coordinator.acquire(&key(None, None), "  ", None),
            Err(LockError::EmptyHolder)
        ));
        assert!(matches!(
            coordinator.release(&key(None, None), ""),
            Err(LockError::EmptyHolder)
        ));
    }

    #[test]
    fn test_absent_record_is_unlocked() {
        let (_, coordinator) = setup();
        assert_eq!(
            coordinator.check_lock(&key(Some("x"), Some(1))).unwrap(),
            LockStatus::unlocked()
        );
    }

    #[test]
    fn test_narrower_lock_does_not_deny_broader_acquire() {
        let (_, coordinator) = setup();
        let narrow = key(Some("5.4.1"), Some(3));
        let broad = key(None, Some(3));

        assert!(matches!(
            coordinator.acquire(&narrow, "userA", None).unwrap(),
            AcquireOutcome::Acquired(_)
        ));
        // Only broader keys are consulted, so the department-wide lock is
        // granted alongside the narrower one.
        assert!(matches!(
            coordinator.acquire(&broad, "userB", None).unwrap(),
            AcquireOutcome::Acquired(_)
        ));

        // The narrower key itself stays exclusive.
        assert!(matches!(
            coordinator.acquire(&narrow, "userB", None).unwrap(),
            AcquireOutcome::AlreadyLocked(_)
        ));
    }
}
