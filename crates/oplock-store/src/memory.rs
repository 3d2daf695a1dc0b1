//! In-memory implementation of [`LockStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and single-process
//! deployments. Records live in a `DashMap`; `update` runs inside the map's
//! entry guard, which holds the shard lock for the key, so concurrent updates
//! to one key are serialized.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::StorageError;
use crate::traits::{check_put_key, LockStore, RecordUpdate};
use crate::types::{LockRecord, ResourceKey};

/// DashMap-backed lock store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<ResourceKey, LockRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LockStore for InMemoryStore {
    fn get(&self, key: &ResourceKey) -> Result<Option<LockRecord>, StorageError> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    fn list(&self) -> Result<Vec<LockRecord>, StorageError> {
        let mut records: Vec<LockRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.key.storage_key().cmp(&b.key.storage_key()));
        Ok(records)
    }

    fn update(
        &self,
        key: &ResourceKey,
        decide: &mut dyn FnMut(Option<&LockRecord>) -> RecordUpdate,
    ) -> Result<(), StorageError> {
        match self.records.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match decide(Some(occupied.get())) {
                RecordUpdate::Keep => {}
                RecordUpdate::Put(record) => {
                    check_put_key(key, &record)?;
                    occupied.insert(record);
                }
                RecordUpdate::Remove => {
                    occupied.remove();
                }
            },
            Entry::Vacant(vacant) => match decide(None) {
                RecordUpdate::Put(record) => {
                    check_put_key(key, &record)?;
                    vacant.insert(record);
                }
                RecordUpdate::Keep | RecordUpdate::Remove => {}
            },
        }
        Ok(())
    }
}
