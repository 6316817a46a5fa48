//! Ollama backend adapter
//!
//! Streams chat completions from an Ollama-compatible `/api/chat` endpoint,
//! translating its NDJSON wire chunks into `StreamEvent`s. One network
//! connection is held for the lifetime of the returned stream and dropped on
//! every exit path, including cancellation.

use crate::backend::types::{OllamaChatChunk, StreamErrorKind, StreamEvent};
use crate::backend::{EventStream, GenerateOptions, InferenceBackend};
use crate::error::AppError;
use crate::message::ChatMessage;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Adapter for an Ollama-compatible inference server
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    read_timeout: Duration,
}

impl OllamaBackend {
    /// Create a new adapter using a shared HTTP client
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            read_timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn build_body(
        messages: &[ChatMessage],
        model: &str,
        options: &GenerateOptions,
    ) -> serde_json::Value {
        let mut opts = serde_json::Map::new();
        if let Some(t) = options.temperature {
            opts.insert("temperature".into(), json!(t));
        }
        if let Some(p) = options.top_p {
            opts.insert("top_p".into(), json!(p));
        }
        if let Some(k) = options.top_k {
            opts.insert("top_k".into(), json!(k));
        }
        if let Some(s) = options.seed {
            opts.insert("seed".into(), json!(s));
        }

        json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "options": opts,
        })
    }

    /// Translate one parsed wire chunk into zero or more events
    ///
    /// Returns `true` when the chunk was terminal and the stream should end.
    fn chunk_events(chunk: OllamaChatChunk, out: &mut Vec<StreamEvent>) -> bool {
        if let Some(error) = chunk.error {
            out.push(StreamEvent::Error {
                kind: StreamErrorKind::Protocol,
                message: error,
            });
            return true;
        }

        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                out.push(StreamEvent::ContentDelta(message.content));
            }
            if let Some(images) = message.images {
                out.extend(images.into_iter().map(StreamEvent::Image));
            }
            if let Some(calls) = message.tool_calls {
                out.extend(calls.into_iter().map(StreamEvent::ToolCall));
            }
        }

        if chunk.done {
            out.push(StreamEvent::Metrics(chunk.metrics));
            out.push(StreamEvent::Done {
                reason: chunk.done_reason.unwrap_or_else(|| "stop".to_string()),
            });
            return true;
        }

        false
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        model: String,
        options: GenerateOptions,
        token: CancellationToken,
    ) -> Result<EventStream, AppError> {
        if messages.is_empty() {
            return Err(AppError::Validation(
                "messages must not be empty".to_string(),
            ));
        }

        let url = format!("{}/api/chat", self.base_url);
        let body = Self::build_body(&messages, &model, &options);

        debug!(
            url = %url,
            model = %model,
            message_count = messages.len(),
            "Starting backend generation"
        );

        // No whole-request deadline: the shared client bounds the connect
        // phase and the read loop below bounds each chunk, so a healthy
        // long-running generation is never cut off mid-body
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("backend connect timed out: {}", e))
                } else {
                    AppError::BackendUnreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "rate limit exceeded".to_string());
            warn!(status = 429, "Backend rate-limited the request");
            // Surfaced as the first (and only) stream event per the adapter contract
            let event = StreamEvent::Error {
                kind: StreamErrorKind::RateLimited,
                message: detail,
            };
            return Ok(futures_util::stream::iter(vec![event]).boxed());
        }
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(AppError::BackendUnreachable(format!(
                "backend returned status {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let read_timeout = self.read_timeout;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buf: Vec<u8> = Vec::new();
            let mut terminal = false;

            'read: loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Backend stream cancelled by token");
                        yield StreamEvent::AbortAck;
                        break 'read;
                    }
                    next = tokio::time::timeout(read_timeout, bytes.next()) => next,
                };

                let chunk = match next {
                    Err(_) => {
                        yield StreamEvent::Error {
                            kind: StreamErrorKind::Connection,
                            message: format!(
                                "backend read timed out after {}s",
                                read_timeout.as_secs()
                            ),
                        };
                        break 'read;
                    }
                    Ok(None) => break 'read,
                    Ok(Some(Err(e))) => {
                        yield StreamEvent::Error {
                            kind: StreamErrorKind::Connection,
                            message: e.to_string(),
                        };
                        break 'read;
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };

                buf.extend_from_slice(&chunk);

                // Drain complete NDJSON lines; a partial line stays buffered
                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let parsed: OllamaChatChunk = match serde_json::from_str(line) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            yield StreamEvent::Error {
                                kind: StreamErrorKind::Protocol,
                                message: format!("malformed backend payload: {}", e),
                            };
                            break 'read;
                        }
                    };

                    let mut events = Vec::new();
                    let done = OllamaBackend::chunk_events(parsed, &mut events);
                    for event in events {
                        yield event;
                    }
                    if done {
                        terminal = true;
                        break 'read;
                    }
                }
            }

            if !terminal && !token.is_cancelled() {
                // Only reached when the body ended without a terminal chunk
                if !buf.is_empty() {
                    yield StreamEvent::Error {
                        kind: StreamErrorKind::Protocol,
                        message: "backend stream ended with a partial payload".to_string(),
                    };
                }
            }
        };

        Ok(stream.boxed())
    }
}
