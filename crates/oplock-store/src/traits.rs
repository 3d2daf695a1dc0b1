//! The [`LockStore`] trait defining the storage contract for lock records.
//!
//! The store is deliberately dumb: it keeps at most one [`LockRecord`] per
//! [`ResourceKey`] and offers a single atomic read-modify-write primitive.
//! Staleness, specificity and holder rules live in the coordinator.

use crate::error::StorageError;
use crate::types::{LockRecord, ResourceKey};

/// What [`LockStore::update`] should do with the record at a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// Leave the stored state untouched.
    Keep,
    /// Insert or overwrite the record. Its key must equal the updated key.
    Put(LockRecord),
    /// Delete the record if one exists.
    Remove,
}

/// The storage contract for lock records.
///
/// Implementations are shared across request handlers, so every method takes
/// `&self`. The trait is synchronous, matching the single authoritative store
/// it fronts.
pub trait LockStore: Send + Sync {
    /// Returns the record stored at `key`, if any.
    fn get(&self, key: &ResourceKey) -> Result<Option<LockRecord>, StorageError>;

    /// Returns the records stored at any of `keys`, skipping absent ones.
    fn get_many(&self, keys: &[ResourceKey]) -> Result<Vec<LockRecord>, StorageError> {
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.get(key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Returns every stored record, unfiltered.
    fn list(&self) -> Result<Vec<LockRecord>, StorageError>;

    /// Atomically reads the record at `key`, passes it to `decide`, and
    /// applies the returned [`RecordUpdate`].
    ///
    /// No other update to the same key may interleave between the read and
    /// the write.
    fn update(
        &self,
        key: &ResourceKey,
        decide: &mut dyn FnMut(Option<&LockRecord>) -> RecordUpdate,
    ) -> Result<(), StorageError>;
}

/// Rejects writes whose record key differs from the key being updated.
pub(crate) fn check_put_key(key: &ResourceKey, record: &LockRecord) -> Result<(), StorageError> {
    if record.key != *key {
        return Err(StorageError::IntegrityError {
            reason: format!("record for {} written at key {}", record.key, key),
        });
    }
    Ok(())
}
