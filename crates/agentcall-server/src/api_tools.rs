//! The four conversation tools.
//!
//! Each handler runs its call operation under a child of the server's
//! shutdown token, so a shutdown interrupts ringing, speaking and listening
//! instead of waiting them out.

use crate::api::ApiError;
use crate::AppState;
use agentcall_types::tools::{
    ContinueCallRequest, ContinueCallResponse, EndCallRequest, EndCallResponse,
    InitiateCallRequest, InitiateCallResponse, SpeakToUserRequest, SpeakToUserResponse,
};
use axum::extract::{Extension, Json};
use std::sync::Arc;

/// Handler for `POST /api/tools/initiate_call`.
pub async fn initiate_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<InitiateCallRequest>,
) -> Result<Json<InitiateCallResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    let call = state.calls.initiate(&payload.message, &cancel).await?;

    Ok(Json(InitiateCallResponse {
        call_id: call.call_id,
        response: call.utterance.text,
    }))
}

/// Handler for `POST /api/tools/continue_call`.
pub async fn continue_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ContinueCallRequest>,
) -> Result<Json<ContinueCallResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    let utterance = state
        .calls
        .continue_call(&payload.call_id, &payload.message, &cancel)
        .await?;

    Ok(Json(ContinueCallResponse {
        response: utterance.text,
    }))
}

/// Handler for `POST /api/tools/speak_to_user`.
pub async fn speak_to_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SpeakToUserRequest>,
) -> Result<Json<SpeakToUserResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    state
        .calls
        .announce(&payload.call_id, &payload.message, &cancel)
        .await?;

    Ok(Json(SpeakToUserResponse { success: true }))
}

/// Handler for `POST /api/tools/end_call`.
pub async fn end_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<EndCallRequest>,
) -> Result<Json<EndCallResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    let duration = state
        .calls
        .end(&payload.call_id, payload.message.as_deref(), &cancel)
        .await?;

    Ok(Json(EndCallResponse {
        duration_seconds: duration.as_secs_f64(),
    }))
}
