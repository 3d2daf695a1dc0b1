//! Schema types for the lock API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use oplock_store::{LockRecord, OperationKind, ResourceKey};

use crate::coordinator::InspectedRecord;
use crate::error::ApiError;

/// Query string of `GET /locks/check`.
///
/// Every field is taken as a raw string so that a missing operation or a
/// malformed department id is reported as a JSON `BAD_REQUEST` instead of an
/// extractor rejection. Blank values count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckLockQuery {
    pub operation: Option<String>,
    pub kpi: Option<String>,
    #[serde(rename = "departmentId", alias = "department_id")]
    pub department_id: Option<String>,
}

impl CheckLockQuery {
    pub fn resource_key(&self) -> Result<ResourceKey, ApiError> {
        resource_key(
            self.operation.as_deref(),
            self.kpi.as_deref(),
            parse_department_id(self.department_id.as_deref())?,
        )
    }
}

fn parse_department_id(raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            ApiError::BadRequest(format!("invalid departmentId '{value}': expected an integer"))
        }),
    }
}

/// A lock target in a JSON body: `{operation, kpi?, department_id?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct LockTarget {
    pub operation: String,
    #[serde(default)]
    pub kpi: Option<String>,
    #[serde(default, alias = "departmentId")]
    pub department_id: Option<i64>,
}

impl LockTarget {
    pub fn resource_key(&self) -> Result<ResourceKey, ApiError> {
        resource_key(Some(&self.operation), self.kpi.as_deref(), self.department_id)
    }
}

fn resource_key(
    operation: Option<&str>,
    kpi: Option<&str>,
    department_id: Option<i64>,
) -> Result<ResourceKey, ApiError> {
    let operation = operation
        .ok_or_else(|| ApiError::BadRequest("missing required parameter: operation".to_string()))?;
    let operation: OperationKind = operation.parse().map_err(|_| {
        ApiError::BadRequest(format!(
            "invalid operation '{operation}': expected 'add' or 'delete'"
        ))
    })?;
    Ok(ResourceKey::new(operation, kpi, department_id))
}

/// Response of `GET /locks/check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckLockResponse {
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<String>,
}

/// Request of `POST /locks/check-batch`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchCheckRequest {
    pub checks: Vec<LockTarget>,
}

/// One answer in a batch check, echoing the normalized target.
#[derive(Debug, Clone, Serialize)]
pub struct BatchCheckResult {
    pub operation: OperationKind,
    pub kpi: Option<String>,
    pub department_id: Option<i64>,
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchCheckResponse {
    pub results: Vec<BatchCheckResult>,
}

/// Request of `POST /locks/acquire` and `POST /locks/block`.
#[derive(Debug, Clone, Deserialize)]
pub struct LockRequest {
    #[serde(flatten)]
    pub target: LockTarget,
    /// Why the lock is held, shown to operators who are turned away.
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquireLockResponse {
    pub acquired: bool,
    pub record: LockRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseLockResponse {
    pub released: bool,
}

/// Response of `POST /locks/release-all`: the keys that were removed.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseAllResponse {
    pub released: Vec<ResourceKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockLockResponse {
    pub record: LockRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearLockResponse {
    pub cleared: bool,
}

/// One row of `GET /locks/debug`.
#[derive(Debug, Clone, Serialize)]
pub struct LockRecordView {
    pub operation: OperationKind,
    pub kpi: Option<String>,
    pub department_id: Option<i64>,
    pub is_locked: bool,
    pub reason: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub holder: Option<String>,
    pub is_stale: bool,
}

impl From<InspectedRecord> for LockRecordView {
    fn from(inspected: InspectedRecord) -> Self {
        let InspectedRecord { record, is_stale } = inspected;
        LockRecordView {
            operation: record.key.operation(),
            kpi: record.key.kpi().map(str::to_string),
            department_id: record.key.department_id(),
            is_locked: record.is_locked,
            reason: record.reason,
            acquired_at: record.acquired_at,
            holder: record.holder,
            is_stale,
        }
    }
}
