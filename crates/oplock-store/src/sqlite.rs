//! SQLite implementation of [`LockStore`].
//!
//! [`SqliteStore`] persists lock records in a single `operation_locks` table.
//! `update` runs as a `BEGIN IMMEDIATE` transaction so the check and the
//! write happen under SQLite's write lock, even across processes sharing the
//! database file.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::StorageError;
use crate::traits::{check_put_key, LockStore, RecordUpdate};
use crate::types::{LockRecord, OperationKind, ResourceKey};

const SELECT_COLUMNS: &str =
    "SELECT operation, kpi, department_id, is_locked, reason, acquired_at, holder FROM operation_locks";

/// Raw column values of one `operation_locks` row.
type RawRow = (
    String,
    Option<String>,
    Option<i64>,
    bool,
    Option<String>,
    DateTime<Utc>,
    Option<String>,
);

/// SQLite-backed implementation of [`LockStore`].
///
/// `rusqlite::Connection` is `!Sync`, so it sits behind a `Mutex`; the mutex
/// serializes callers within this process and the immediate transaction
/// serializes writers across processes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        tracing::debug!(path, "opened sqlite lock store");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::ConnectionPoisoned)
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn into_record(raw: RawRow) -> Result<LockRecord, StorageError> {
        let (operation, kpi, department_id, is_locked, reason, acquired_at, holder) = raw;
        let operation: OperationKind =
            operation
                .parse()
                .map_err(|_| StorageError::IntegrityError {
                    reason: format!("stored operation {operation:?} is not add/delete"),
                })?;
        Ok(LockRecord {
            key: ResourceKey::new(operation, kpi.as_deref(), department_id),
            is_locked,
            reason,
            acquired_at,
            holder,
        })
    }

    fn select(conn: &Connection, key: &ResourceKey) -> Result<Option<LockRecord>, StorageError> {
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE resource_key = ?1"),
                params![key.storage_key()],
                Self::read_row,
            )
            .optional()?;
        raw.map(Self::into_record).transpose()
    }
}

impl LockStore for SqliteStore {
    fn get(&self, key: &ResourceKey) -> Result<Option<LockRecord>, StorageError> {
        let conn = self.conn()?;
        Self::select(&conn, key)
    }

    fn list(&self) -> Result<Vec<LockRecord>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY resource_key"))?;
        let rows = stmt.query_map([], Self::read_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::into_record(row?)?);
        }
        Ok(records)
    }

    fn update(
        &self,
        key: &ResourceKey,
        decide: &mut dyn FnMut(Option<&LockRecord>) -> RecordUpdate,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = Self::select(&tx, key)?;
        match decide(current.as_ref()) {
            RecordUpdate::Keep => {}
            RecordUpdate::Put(record) => {
                check_put_key(key, &record)?;
                tx.execute(
                    "INSERT INTO operation_locks
                        (resource_key, operation, kpi, department_id, is_locked, reason, acquired_at, holder)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(resource_key) DO UPDATE SET
                        is_locked = excluded.is_locked,
                        reason = excluded.reason,
                        acquired_at = excluded.acquired_at,
                        holder = excluded.holder",
                    params![
                        key.storage_key(),
                        key.operation().as_str(),
                        key.kpi(),
                        key.department_id(),
                        record.is_locked,
                        record.reason,
                        record.acquired_at,
                        record.holder,
                    ],
                )?;
            }
            RecordUpdate::Remove => {
                tx.execute(
                    "DELETE FROM operation_locks WHERE resource_key = ?1",
                    params![key.storage_key()],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}
