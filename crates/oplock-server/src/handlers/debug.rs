//! Read-only lock table dump for operator troubleshooting.
//!
//! Not for editing clients; deploy behind an authenticating proxy.

use axum::extract::State;
use axum::Json;

use crate::error::ApiError;
use crate::schema::locks::LockRecordView;
use crate::state::AppState;

/// `GET /locks/debug`
pub async fn dump_locks(State(state): State<AppState>) -> Result<Json<Vec<LockRecordView>>, ApiError> {
    let records = state
        .coordinator
        .inspect()?
        .into_iter()
        .map(LockRecordView::from)
        .collect();
    Ok(Json(records))
}
