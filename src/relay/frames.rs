//! Client wire frames
//!
//! The frame shapes the relay emits to the client, matching the Ollama-style
//! chat response contract: content chunks, a terminal metrics frame, error
//! frames, and the abort acknowledgement. Streaming mode wraps each frame as
//! a server-sent event; non-streaming mode returns the terminal frame alone.

use crate::backend::UsageMetrics;
use chrono::Utc;
use serde::Serialize;

/// Assistant message payload inside a frame
#[derive(Debug, Clone, Serialize)]
pub struct FrameMessage {
    /// Always "assistant" on the way out
    pub role: &'static str,
    /// Message text (a delta in streaming mode, the full text otherwise)
    pub content: String,
    /// Images accumulated from the backend, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Tool calls accumulated from the backend, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
}

/// One chat response frame
#[derive(Debug, Clone, Serialize)]
pub struct ChatFrame {
    /// Model that produced the response
    pub model: String,
    /// RFC 3339 timestamp of frame creation
    pub created_at: String,
    /// Whether this is the terminal frame
    pub done: bool,
    /// Message payload; absent on a bare terminal frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<FrameMessage>,
    /// Completion reason, only on terminal frames ("stop" or "error")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Error detail, only on error frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Usage metrics, only on the terminal frame
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<UsageMetrics>,
}

impl ChatFrame {
    /// A streaming content delta
    pub fn delta(model: &str, content: String) -> Self {
        Self {
            model: model.to_string(),
            created_at: Utc::now().to_rfc3339(),
            done: false,
            message: Some(FrameMessage {
                role: "assistant",
                content,
                images: None,
                tool_calls: None,
            }),
            done_reason: None,
            error: None,
            metrics: None,
        }
    }

    /// The terminal frame of a successful stream
    pub fn done(model: &str, reason: String, metrics: UsageMetrics) -> Self {
        Self {
            model: model.to_string(),
            created_at: Utc::now().to_rfc3339(),
            done: true,
            message: None,
            done_reason: Some(reason),
            error: None,
            metrics: Some(metrics),
        }
    }

    /// The single response of a non-streaming request
    pub fn completed(
        model: &str,
        content: String,
        images: Option<Vec<String>>,
        tool_calls: Option<Vec<serde_json::Value>>,
        metrics: UsageMetrics,
    ) -> Self {
        Self {
            model: model.to_string(),
            created_at: Utc::now().to_rfc3339(),
            done: true,
            message: Some(FrameMessage {
                role: "assistant",
                content,
                images,
                tool_calls,
            }),
            done_reason: Some("stop".to_string()),
            error: None,
            metrics: Some(metrics),
        }
    }

    /// A terminal error frame
    pub fn error(model: &str, message: String) -> Self {
        Self {
            model: model.to_string(),
            created_at: Utc::now().to_rfc3339(),
            done: true,
            message: Some(FrameMessage {
                role: "assistant",
                content: format!("Error: {}", message),
                images: None,
                tool_calls: None,
            }),
            done_reason: Some("error".to_string()),
            error: Some(message),
            metrics: None,
        }
    }
}

/// The abort acknowledgement frame
#[derive(Debug, Clone, Serialize)]
pub struct AbortFrame {
    /// Always "abort"
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl AbortFrame {
    /// Create the acknowledgement frame
    pub fn new() -> Self {
        Self { kind: "abort" }
    }
}

impl Default for AbortFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a frame as a server-sent event
pub fn sse(frame: &impl Serialize) -> String {
    // Serialization of these frames cannot fail; fall back to an empty object
    let json = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_frame_shape() {
        let frame = ChatFrame::delta("m", "hi".into());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["done"], false);
        assert_eq!(json["message"]["role"], "assistant");
        assert_eq!(json["message"]["content"], "hi");
        assert!(json.get("done_reason").is_none());
        assert!(json.get("total_duration").is_none());
    }

    #[test]
    fn test_done_frame_flattens_metrics() {
        let metrics = UsageMetrics {
            total_duration: 5,
            eval_count: 3,
            ..Default::default()
        };
        let frame = ChatFrame::done("m", "stop".into(), metrics);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["done"], true);
        assert_eq!(json["done_reason"], "stop");
        assert_eq!(json["total_duration"], 5);
        assert_eq!(json["eval_count"], 3);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = ChatFrame::error("m", "backend exploded".into());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["done"], true);
        assert_eq!(json["done_reason"], "error");
        assert_eq!(json["error"], "backend exploded");
        assert_eq!(json["message"]["content"], "Error: backend exploded");
    }

    #[test]
    fn test_abort_frame_shape() {
        let json = serde_json::to_value(AbortFrame::new()).unwrap();
        assert_eq!(json["type"], "abort");
    }

    #[test]
    fn test_sse_encoding() {
        let encoded = sse(&AbortFrame::new());
        assert_eq!(encoded, "data: {\"type\":\"abort\"}\n\n");
    }
}
