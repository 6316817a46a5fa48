//! Session control endpoints
//!
//! Abort of in-flight generation and clearing of stored conversation
//! context, both keyed by the session header.

use crate::api::{session_id_from_headers, GatewayState};
use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use tracing::info;

/// Response body of POST /api/abort
#[derive(Debug, Serialize)]
pub struct AbortResponse {
    /// Whether an in-flight request was actually cancelled
    pub aborted: bool,
}

/// Response body of POST /api/clear
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    /// Always "success"
    pub status: &'static str,
    /// Number of messages removed from the session
    pub cleared_messages: usize,
}

/// POST /api/abort - cancel the session's in-flight generation
///
/// Always returns 200; `aborted` is false when nothing was in flight,
/// so repeated aborts are harmless.
pub async fn abort(State(state): State<GatewayState>, headers: HeaderMap) -> Json<AbortResponse> {
    let session_id = session_id_from_headers(&headers);
    let aborted = state.registry.abort(&session_id);
    info!(session_id = %session_id, aborted, "Abort requested");
    Json(AbortResponse { aborted })
}

/// POST /api/clear - drop the session's stored conversation context
pub async fn clear(State(state): State<GatewayState>, headers: HeaderMap) -> Json<ClearResponse> {
    let session_id = session_id_from_headers(&headers);
    let cleared_messages = state.sessions.clear(&session_id).await;
    info!(session_id = %session_id, cleared_messages, "Session context cleared");
    Json(ClearResponse {
        status: "success",
        cleared_messages,
    })
}
