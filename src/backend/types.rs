//! Backend stream event types
//!
//! Defines the provider-neutral `StreamEvent` contract that every backend
//! adapter normalizes into, plus the Ollama wire chunk shapes the adapter
//! parses from the upstream NDJSON stream.

use serde::{Deserialize, Serialize};

/// Kind of a mid-stream backend error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Upstream returned a rate-limit response
    RateLimited,
    /// Upstream sent a payload the adapter could not parse
    Protocol,
    /// The connection dropped or timed out mid-stream
    Connection,
}

impl StreamErrorKind {
    /// Stable label for logs and error frames
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamErrorKind::RateLimited => "rate_limited",
            StreamErrorKind::Protocol => "protocol",
            StreamErrorKind::Connection => "connection",
        }
    }
}

/// Token usage and timing metrics reported by the backend
///
/// Field names match the Ollama terminal chunk; all durations are nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Wall time for the whole generation
    #[serde(default)]
    pub total_duration: u64,
    /// Time spent loading the model
    #[serde(default)]
    pub load_duration: u64,
    /// Number of prompt tokens evaluated
    #[serde(default)]
    pub prompt_eval_count: u64,
    /// Time spent evaluating the prompt
    #[serde(default)]
    pub prompt_eval_duration: u64,
    /// Number of tokens generated
    #[serde(default)]
    pub eval_count: u64,
    /// Time spent generating tokens
    #[serde(default)]
    pub eval_duration: u64,
}

/// One event in a backend generation stream
///
/// Adapters translate their provider's native wire shape into this union;
/// the relay consumes it and re-emits client frames.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A fragment of assistant text
    ContentDelta(String),
    /// A structured tool call emitted by the model
    ToolCall(serde_json::Value),
    /// A base64-encoded image emitted by the model
    Image(String),
    /// Usage metrics, sent once alongside the terminal chunk
    Metrics(UsageMetrics),
    /// The stream failed; no further content follows
    Error {
        /// What went wrong
        kind: StreamErrorKind,
        /// Upstream-provided detail
        message: String,
    },
    /// The stream finished normally
    Done {
        /// Upstream completion reason, e.g. "stop"
        reason: String,
    },
    /// The stream was cancelled via the caller's cancellation token
    AbortAck,
}

/// Message payload inside an Ollama chat chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaChunkMessage {
    /// Fragment of assistant text
    #[serde(default)]
    pub content: String,
    /// Base64-encoded images, if the model emitted any
    #[serde(default)]
    pub images: Option<Vec<String>>,
    /// Structured tool calls, if the model emitted any
    #[serde(default)]
    pub tool_calls: Option<Vec<serde_json::Value>>,
}

/// One NDJSON line from the Ollama `/api/chat` stream
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatChunk {
    /// Assistant message fragment; absent on the terminal chunk
    #[serde(default)]
    pub message: Option<OllamaChunkMessage>,
    /// Whether this is the terminal chunk
    #[serde(default)]
    pub done: bool,
    /// Completion reason on the terminal chunk
    #[serde(default)]
    pub done_reason: Option<String>,
    /// Usage metrics, flattened into the terminal chunk
    #[serde(flatten)]
    pub metrics: UsageMetrics,
    /// Upstream error reported in-band
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_chunk() {
        let chunk: OllamaChatChunk = serde_json::from_str(
            r#"{"model":"m","created_at":"2025-01-01T00:00:00Z","message":{"role":"assistant","content":"Hel"},"done":false}"#,
        )
        .unwrap();
        assert!(!chunk.done);
        assert_eq!(chunk.message.unwrap().content, "Hel");
    }

    #[test]
    fn test_parse_terminal_chunk_with_metrics() {
        let chunk: OllamaChatChunk = serde_json::from_str(
            r#"{"model":"m","done":true,"done_reason":"stop","total_duration":123,"eval_count":42}"#,
        )
        .unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.done_reason.as_deref(), Some("stop"));
        assert_eq!(chunk.metrics.total_duration, 123);
        assert_eq!(chunk.metrics.eval_count, 42);
        assert_eq!(chunk.metrics.load_duration, 0);
    }

    #[test]
    fn test_parse_in_band_error() {
        let chunk: OllamaChatChunk =
            serde_json::from_str(r#"{"error":"model not found"}"#).unwrap();
        assert_eq!(chunk.error.as_deref(), Some("model not found"));
    }
}
