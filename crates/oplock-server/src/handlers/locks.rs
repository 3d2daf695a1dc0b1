//! Lock check and mutation handlers.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::coordinator::{AcquireOutcome, LockStatus, ReleaseOutcome};
use crate::error::ApiError;
use crate::handlers::extract_holder;
use crate::schema::locks::{
    AcquireLockResponse, BatchCheckRequest, BatchCheckResponse, BatchCheckResult,
    BlockLockResponse, CheckLockQuery, CheckLockResponse, ClearLockResponse, LockRequest,
    LockTarget, ReleaseAllResponse, ReleaseLockResponse,
};
use crate::state::AppState;

impl From<LockStatus> for CheckLockResponse {
    fn from(status: LockStatus) -> Self {
        CheckLockResponse {
            is_locked: status.is_locked,
            lock_reason: status.reason,
        }
    }
}

/// `GET /locks/check`
pub async fn check_lock(
    State(state): State<AppState>,
    Query(query): Query<CheckLockQuery>,
) -> Result<Json<CheckLockResponse>, ApiError> {
    let key = query.resource_key()?;
    let status = state.coordinator.check_lock(&key)?;
    Ok(Json(status.into()))
}

/// `POST /locks/check-batch`
pub async fn check_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchCheckRequest>,
) -> Result<Json<BatchCheckResponse>, ApiError> {
    let mut results = Vec::with_capacity(req.checks.len());
    for target in &req.checks {
        let key = target.resource_key()?;
        let status = state.coordinator.check_lock(&key)?;
        results.push(BatchCheckResult {
            operation: key.operation(),
            kpi: key.kpi().map(str::to_string),
            department_id: key.department_id(),
            is_locked: status.is_locked,
            lock_reason: status.reason,
        });
    }
    Ok(Json(BatchCheckResponse { results }))
}

/// `POST /locks/acquire`
pub async fn acquire_lock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LockRequest>,
) -> Result<Json<AcquireLockResponse>, ApiError> {
    let holder = extract_holder(&headers)?;
    let key = req.target.resource_key()?;

    match state.coordinator.acquire(&key, &holder, req.reason)? {
        AcquireOutcome::Acquired(record) => Ok(Json(AcquireLockResponse {
            acquired: true,
            record,
        })),
        AcquireOutcome::AlreadyLocked(denial) => Err(ApiError::AlreadyLocked(denial)),
    }
}

/// `POST /locks/release`
pub async fn release_lock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(target): Json<LockTarget>,
) -> Result<Json<ReleaseLockResponse>, ApiError> {
    let holder = extract_holder(&headers)?;
    let key = target.resource_key()?;

    match state.coordinator.release(&key, &holder)? {
        ReleaseOutcome::Released => Ok(Json(ReleaseLockResponse { released: true })),
        ReleaseOutcome::NotHeld => Err(ApiError::NotHeld(key)),
    }
}

/// `POST /locks/release-all`
pub async fn release_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReleaseAllResponse>, ApiError> {
    let holder = extract_holder(&headers)?;
    let released = state.coordinator.release_all(&holder)?;
    Ok(Json(ReleaseAllResponse { released }))
}

/// `POST /locks/block`
pub async fn block_lock(
    State(state): State<AppState>,
    Json(req): Json<LockRequest>,
) -> Result<Json<BlockLockResponse>, ApiError> {
    let key = req.target.resource_key()?;
    let record = state.coordinator.block(&key, req.reason)?;
    Ok(Json(BlockLockResponse { record }))
}

/// `POST /locks/clear`
pub async fn clear_lock(
    State(state): State<AppState>,
    Json(target): Json<LockTarget>,
) -> Result<Json<ClearLockResponse>, ApiError> {
    let key = target.resource_key()?;
    let cleared = state.coordinator.clear(&key)?;
    Ok(Json(ClearLockResponse { cleared }))
}
