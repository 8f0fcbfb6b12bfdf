//! Read-only views of live calls.

use crate::api::ApiError;
use crate::AppState;
use agentcall_calls::SessionSnapshot;
use axum::extract::{Extension, Json, Path};
use std::sync::Arc;

/// Handler for `GET /api/calls`.
pub async fn list_calls_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<Vec<SessionSnapshot>> {
    Json(state.calls.list())
}

/// Handler for `GET /api/calls/{call_id}`.
pub async fn get_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .calls
        .get(&call_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("call not found: {call_id}")))
}
