//! Error types and error handling for the gateway
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// Each variant implements automatic conversion to HTTP responses via
/// `IntoResponse`. Retrieval errors are special: they are swallowed at the
/// augmentation boundary and never fail the chat request.
#[derive(Error, Debug)]
pub enum AppError {
    /// Chat request is malformed or incomplete; rejected before any work starts
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Request lacked a valid API key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The retriever service failed; non-fatal, degrades to an unaugmented prompt
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// The inference backend could not be reached at all
    #[error("Inference backend unreachable: {0}")]
    BackendUnreachable(String),

    /// The inference backend rejected the request with a rate limit
    #[error("Rate limited by inference backend: {0}. Retry after a short delay.")]
    RateLimited(String),

    /// The inference backend sent a payload the adapter could not parse
    #[error("Protocol error from inference backend: {0}")]
    Protocol(String),

    /// A backend call exceeded its configured timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable error kind label, used in terminal error frames and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Retrieval(_) => "retrieval",
            AppError::BackendUnreachable(_) => "backend_unreachable",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Protocol(_) => "protocol",
            AppError::Timeout(_) => "timeout",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Retrieval(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::BackendUnreachable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::Protocol(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
