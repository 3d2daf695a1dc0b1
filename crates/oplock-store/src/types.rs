//! Lock identity and lock record types.
//!
//! A [`ResourceKey`] names what a lock gates: one structural operation on
//! plan entries, optionally narrowed to a KPI key and/or a department.
//! Keys are normalized on construction so that "no KPI" has exactly one
//! representation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Separator used by plan entries that carry several KPI keys at once.
pub const KPI_SEPARATOR: &str = "||";

/// Structural operation a lock gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(OperationKind::Add),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(StorageError::InvalidOperation(s.to_string())),
        }
    }
}

/// Composite identity a lock is scoped to: `(operation, kpi, department_id)`.
///
/// An absent KPI means a department-wide lock (or a global one when the
/// department is absent too). Empty and whitespace-only KPI strings are
/// normalized to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceKey {
    operation: OperationKind,
    kpi: Option<String>,
    department_id: Option<i64>,
}

impl ResourceKey {
    pub fn new(operation: OperationKind, kpi: Option<&str>, department_id: Option<i64>) -> Self {
        let kpi = kpi
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        ResourceKey {
            operation,
            kpi,
            department_id,
        }
    }

    /// The global lock for an operation.
    pub fn global(operation: OperationKind) -> Self {
        ResourceKey::new(operation, None, None)
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn kpi(&self) -> Option<&str> {
        self.kpi.as_deref()
    }

    pub fn department_id(&self) -> Option<i64> {
        self.department_id
    }

    /// Specificity tier, lower is more specific.
    ///
    /// `(kpi, dept)` = 0, `(kpi, -)` = 1, `(-, dept)` = 2, `(-, -)` = 3.
    pub fn specificity(&self) -> u8 {
        match (self.kpi.is_some(), self.department_id.is_some()) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        }
    }

    /// Every key whose lock would govern an operation on `self`, most
    /// specific first. Always starts with `self`.
    pub fn governing_keys(&self) -> Vec<ResourceKey> {
        let op = self.operation;
        let kpi = self.kpi.as_deref();
        let dept = self.department_id;

        let mut keys = vec![self.clone()];
        if kpi.is_some() && dept.is_some() {
            keys.push(ResourceKey::new(op, kpi, None));
            keys.push(ResourceKey::new(op, None, dept));
        }
        if self.specificity() < 3 {
            keys.push(ResourceKey::global(op));
        }
        keys
    }

    /// Splits a multi-KPI key (`"5.4.1||5.4.2"`) into one key per KPI.
    ///
    /// Keys without a KPI, or with a single KPI, yield themselves.
    pub fn split_kpis(&self) -> Vec<ResourceKey> {
        let Some(kpi) = self.kpi.as_deref() else {
            return vec![self.clone()];
        };
        let parts: Vec<&str> = kpi
            .split(KPI_SEPARATOR)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() <= 1 {
            return vec![ResourceKey::new(self.operation, parts.first().copied(), self.department_id)];
        }
        parts
            .into_iter()
            .map(|p| ResourceKey::new(self.operation, Some(p), self.department_id))
            .collect()
    }

    /// Canonical string form used as the primary key by persistent backends.
    ///
    /// Injective: the operation never contains `|` and the department id is
    /// the text after the last `|`.
    pub fn storage_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.operation,
            self.kpi.as_deref().unwrap_or(""),
            self.department_id.map(|d| d.to_string()).unwrap_or_default()
        )
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(kpi={}, department={})",
            self.operation,
            self.kpi.as_deref().unwrap_or("*"),
            self.department_id
                .map(|d| d.to_string())
                .unwrap_or_else(|| "*".to_string())
        )
    }
}

/// Stored lock state for one [`ResourceKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockRecord {
    #[serde(flatten)]
    pub key: ResourceKey,
    pub is_locked: bool,
    pub reason: Option<String>,
    pub acquired_at: DateTime<Utc>,
    /// Session or operator holding the lock; `None` for an administrative
    /// block.
    pub holder: Option<String>,
}

impl LockRecord {
    /// A live hold by `holder`.
    pub fn held(
        key: ResourceKey,
        holder: impl Into<String>,
        reason: Option<String>,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        LockRecord {
            key,
            is_locked: true,
            reason,
            acquired_at,
            holder: Some(holder.into()),
        }
    }

    /// A static block placed by an administrator, not tied to a session.
    pub fn administrative(key: ResourceKey, reason: Option<String>, acquired_at: DateTime<Utc>) -> Self {
        LockRecord {
            key,
            is_locked: true,
            reason,
            acquired_at,
            holder: None,
        }
    }

    pub fn is_administrative(&self) -> bool {
        self.holder.is_none()
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.holder.as_deref() == Some(holder)
    }
}
