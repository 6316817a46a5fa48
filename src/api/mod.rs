//! HTTP API endpoints
//!
//! Handlers for the chat, abort, and session routes, plus the shared router
//! state they operate on.

pub mod chat;
pub mod session;
pub mod streaming;

use crate::abort::AbortRegistry;
use crate::config::{AuthConfig, Config};
use crate::error::AppError;
use crate::relay::ChatRelay;
use crate::session::SessionStore;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Header carrying the client's session identity
pub const SESSION_HEADER: &str = "x-session-id";

/// Header carrying the client's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state injected into every handler
#[derive(Clone)]
pub struct GatewayState {
    /// The chat pipeline
    pub relay: ChatRelay,
    /// In-flight request registry
    pub registry: AbortRegistry,
    /// Per-session conversation state
    pub sessions: SessionStore,
    /// Application configuration
    pub config: Arc<Config>,
}

/// Resolve the session identity for a request
///
/// Falls back to a fresh UUID when the header is missing; such a request is
/// valid but cannot be aborted from another connection.
pub fn session_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Check a request's API key against the configured one
///
/// A no-op unless key checking is enabled. When enabled but no key is
/// configured, every request is rejected rather than silently let through.
pub fn authorize(headers: &HeaderMap, auth: &AuthConfig) -> Result<(), AppError> {
    if !auth.require_api_key {
        return Ok(());
    }

    let expected = auth.api_key.as_deref().ok_or_else(|| {
        AppError::Unauthorized("API key required but none is configured".to_string())
    })?;

    match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(AppError::Unauthorized("invalid API key".to_string())),
        None => Err(AppError::Unauthorized("missing API key".to_string())),
    }
}

/// API-key middleware guarding the chat and session routes
pub async fn require_api_key(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(e) = authorize(request.headers(), &state.config.auth) {
        return e.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(session_id_from_headers(&headers), "abc-123");
    }

    #[test]
    fn test_missing_header_generates_fresh_id() {
        let headers = HeaderMap::new();
        let a = session_id_from_headers(&headers);
        let b = session_id_from_headers(&headers);
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    fn auth(required: bool, key: Option<&str>) -> AuthConfig {
        AuthConfig {
            require_api_key: required,
            api_key: key.map(str::to_string),
        }
    }

    fn key_headers(key: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static(key));
        headers
    }

    #[test]
    fn test_authorize_disabled_accepts_everything() {
        assert!(authorize(&HeaderMap::new(), &auth(false, None)).is_ok());
        assert!(authorize(&key_headers("anything"), &auth(false, Some("other"))).is_ok());
    }

    #[test]
    fn test_authorize_accepts_matching_key() {
        assert!(authorize(&key_headers("secret"), &auth(true, Some("secret"))).is_ok());
    }

    #[test]
    fn test_authorize_rejects_missing_key() {
        let result = authorize(&HeaderMap::new(), &auth(true, Some("secret")));
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_authorize_rejects_wrong_key() {
        let result = authorize(&key_headers("guess"), &auth(true, Some("secret")));
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_authorize_rejects_all_when_required_but_unset() {
        let result = authorize(&key_headers("anything"), &auth(true, None));
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }
}
