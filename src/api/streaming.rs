//! Streaming utilities for Server-Sent Events (SSE)
//!
//! Wraps a relay frame stream into an SSE HTTP response.

use crate::error::AppError;
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use futures_util::{Stream, StreamExt};

/// Build an SSE response from a stream of already-encoded frames
///
/// # Arguments
/// * `frames` - Stream of `data: <json>\n\n` strings from the relay
///
/// # Returns
/// * `Result<Response, AppError>` - SSE HTTP response or error
pub fn create_sse_response(
    frames: impl Stream<Item = String> + Send + 'static,
) -> Result<Response, AppError> {
    let body_stream = frames.map(Ok::<_, std::io::Error>);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(body_stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build SSE response: {}", e)))
}
