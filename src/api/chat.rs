//! Chat API endpoint
//!
//! Validates incoming chat requests and hands them to the relay, returning
//! either an SSE stream or a single buffered response.

use crate::api::streaming::create_sse_response;
use crate::api::{session_id_from_headers, GatewayState};
use crate::backend::GenerateOptions;
use crate::error::AppError;
use crate::message::{ChatMessage, ChatRole};
use crate::relay::frames::AbortFrame;
use crate::relay::{BufferedOutcome, ChatRequest};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Request body of POST /api/chat
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    /// Model identifier; falls back to the configured default
    pub model: Option<String>,
    /// Conversation messages, required and non-empty
    pub messages: Option<Vec<IncomingMessage>>,
    /// Whether to stream the response (default true)
    pub stream: Option<bool>,
    /// Request options
    #[serde(default)]
    pub options: ChatRequestOptions,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff
    pub top_k: Option<u32>,
    /// Deterministic seed
    pub seed: Option<i64>,
}

/// The `options` object of a chat request
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequestOptions {
    /// Retrieval index; absence disables augmentation
    pub index: Option<String>,
}

/// One message as received on the wire, validated before use
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    /// Sender role
    pub role: Option<String>,
    /// Message text
    pub content: Option<String>,
    /// Image attachments; must be a list when present
    pub images: Option<Value>,
    /// Tool calls; must be a list when present
    pub tool_calls: Option<Value>,
}

fn parse_role(role: &str) -> Result<ChatRole, AppError> {
    match role {
        "system" => Ok(ChatRole::System),
        "user" => Ok(ChatRole::User),
        "assistant" => Ok(ChatRole::Assistant),
        "tool" => Ok(ChatRole::Tool),
        other => Err(AppError::Validation(format!(
            "invalid message role: {:?}",
            other
        ))),
    }
}

fn parse_string_list(value: Value, field: &str) -> Result<Vec<String>, AppError> {
    let items = value
        .as_array()
        .ok_or_else(|| AppError::Validation(format!("{} must be provided as a list", field)))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| AppError::Validation(format!("{} entries must be strings", field)))
        })
        .collect()
}

/// Validate a request body and turn it into a pipeline request
///
/// All validation happens here, before any retrieval or generation starts.
pub fn parse_chat_request(
    body: ChatRequestBody,
    default_model: &str,
) -> Result<ChatRequest, AppError> {
    let incoming = body
        .messages
        .ok_or_else(|| AppError::Validation("no messages provided".to_string()))?;
    if incoming.is_empty() {
        return Err(AppError::Validation("no messages provided".to_string()));
    }

    let mut messages = Vec::with_capacity(incoming.len());
    for message in incoming {
        let role = message
            .role
            .as_deref()
            .ok_or_else(|| AppError::Validation("invalid message format".to_string()))?;
        let content = message
            .content
            .ok_or_else(|| AppError::Validation("invalid message format".to_string()))?;

        let images = message
            .images
            .map(|v| parse_string_list(v, "images"))
            .transpose()?;
        let tool_calls = message
            .tool_calls
            .map(|v| {
                v.as_array().cloned().ok_or_else(|| {
                    AppError::Validation("tool_calls must be provided as a list".to_string())
                })
            })
            .transpose()?;

        messages.push(ChatMessage {
            role: parse_role(role)?,
            content,
            images,
            tool_calls,
        });
    }

    if !messages.iter().any(|m| !m.content.is_empty()) {
        return Err(AppError::Validation(
            "no message with content found".to_string(),
        ));
    }

    let model = match body.model {
        Some(model) if !model.trim().is_empty() => model,
        _ => default_model.to_string(),
    };

    Ok(ChatRequest {
        model,
        messages,
        stream: body.stream.unwrap_or(true),
        index: body.options.index,
        options: GenerateOptions {
            temperature: body.temperature,
            top_p: body.top_p,
            top_k: body.top_k,
            seed: body.seed,
        },
    })
}

/// POST /api/chat - run a chat request through the relay
pub async fn chat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequestBody>,
) -> Result<Response, AppError> {
    let request = parse_chat_request(body, &state.config.backend.default_model)?;
    let session_id = session_id_from_headers(&headers);

    info!(
        session_id = %session_id,
        model = %request.model,
        stream = request.stream,
        index = ?request.index,
        message_count = request.messages.len(),
        "Chat request accepted"
    );

    if request.stream {
        let frames = state.relay.run_streaming(session_id, request);
        create_sse_response(frames)
    } else {
        match state.relay.run_buffered(&session_id, request).await? {
            BufferedOutcome::Completed(frame) => Ok(Json(frame).into_response()),
            BufferedOutcome::Aborted => Ok(Json(AbortFrame::new()).into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: Value) -> ChatRequestBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_minimal_request_parses() {
        let request = parse_chat_request(
            body(serde_json::json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
            })),
            "default-model",
        )
        .unwrap();
        assert_eq!(request.model, "m");
        assert!(request.stream);
        assert!(request.index.is_none());
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_missing_messages_rejected() {
        let result = parse_chat_request(body(serde_json::json!({"model": "m"})), "d");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_empty_messages_rejected() {
        let result = parse_chat_request(
            body(serde_json::json!({"model": "m", "messages": []})),
            "d",
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_invalid_role_rejected() {
        let result = parse_chat_request(
            body(serde_json::json!({
                "model": "m",
                "messages": [{"role": "wizard", "content": "hi"}],
            })),
            "d",
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_message_without_content_rejected() {
        let result = parse_chat_request(
            body(serde_json::json!({
                "model": "m",
                "messages": [{"role": "user"}],
            })),
            "d",
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_all_empty_content_rejected() {
        let result = parse_chat_request(
            body(serde_json::json!({
                "model": "m",
                "messages": [{"role": "user", "content": ""}],
            })),
            "d",
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_images_must_be_list() {
        let result = parse_chat_request(
            body(serde_json::json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi", "images": "nope"}],
            })),
            "d",
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_missing_model_uses_default() {
        let request = parse_chat_request(
            body(serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
            })),
            "fallback",
        )
        .unwrap();
        assert_eq!(request.model, "fallback");
    }

    #[test]
    fn test_index_and_sampling_options() {
        let request = parse_chat_request(
            body(serde_json::json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": false,
                "options": {"index": "docs"},
                "temperature": 0.5,
                "seed": 42,
            })),
            "d",
        )
        .unwrap();
        assert!(!request.stream);
        assert_eq!(request.index.as_deref(), Some("docs"));
        assert_eq!(request.options.temperature, Some(0.5));
        assert_eq!(request.options.seed, Some(42));
    }
}
