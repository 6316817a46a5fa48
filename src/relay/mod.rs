//! Stream relay
//!
//! The core request pipeline: drives retrieval, prompt augmentation, the
//! backend call, and relays the event stream to the client while filtering
//! reasoning blocks. Tracks per-request cancellation through the abort
//! registry and guarantees exactly one terminal frame per request.

pub mod filter;
pub mod frames;

use crate::abort::AbortRegistry;
use crate::augment::{augment, AugmentOutcome};
use crate::backend::{
    GenerateOptions, InferenceBackend, StreamErrorKind, StreamEvent, UsageMetrics,
};
use crate::config::Config;
use crate::error::AppError;
use crate::message::{ChatMessage, ChatRole};
use crate::relay::filter::ReasoningFilter;
use crate::relay::frames::{sse, AbortFrame, ChatFrame, FrameMessage};
use crate::retrieval::Retriever;
use crate::session::SessionStore;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Pipeline phase, logged at every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayPhase {
    Retrieving,
    Augmenting,
    Generating,
    Relaying,
    Aborting,
    Completed,
}

impl RelayPhase {
    fn as_str(&self) -> &'static str {
        match self {
            RelayPhase::Retrieving => "retrieving",
            RelayPhase::Augmenting => "augmenting",
            RelayPhase::Generating => "generating",
            RelayPhase::Relaying => "relaying",
            RelayPhase::Aborting => "aborting",
            RelayPhase::Completed => "completed",
        }
    }
}

/// A validated chat request, ready for the pipeline
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Conversation so far, last entry is the active query
    pub messages: Vec<ChatMessage>,
    /// Whether to stream the response
    pub stream: bool,
    /// Retrieval index; `None` disables augmentation entirely
    pub index: Option<String>,
    /// Generation parameters
    pub options: GenerateOptions,
}

impl ChatRequest {
    /// The active query: content of the latest message that has any
    pub fn latest_query(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .map(|m| m.content.as_str())
            .find(|c| !c.is_empty())
    }
}

/// Result of a non-streaming request
#[derive(Debug)]
pub enum BufferedOutcome {
    /// Generation finished; the single terminal response frame
    Completed(ChatFrame),
    /// The request was aborted mid-generation
    Aborted,
}

/// The chat relay pipeline
///
/// Cheap to clone; all components are shared handles.
#[derive(Clone)]
pub struct ChatRelay {
    backend: Arc<dyn InferenceBackend>,
    retriever: Arc<dyn Retriever>,
    registry: AbortRegistry,
    sessions: SessionStore,
    config: Arc<Config>,
}

impl ChatRelay {
    /// Assemble the pipeline from its components
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        retriever: Arc<dyn Retriever>,
        registry: AbortRegistry,
        sessions: SessionStore,
        config: Arc<Config>,
    ) -> Self {
        Self {
            backend,
            retriever,
            registry,
            sessions,
            config,
        }
    }

    /// Retrieval + augmentation stages, shared by both response modes
    ///
    /// Retrieval failure is non-fatal: it degrades to an unaugmented prompt
    /// and is only logged.
    async fn prepare(&self, request: &ChatRequest) -> (Vec<ChatMessage>, AugmentOutcome) {
        let chunks = match &request.index {
            None => {
                debug!(phase = RelayPhase::Augmenting.as_str(), "Augmentation disabled, no index");
                let (messages, _) = augment(
                    &request.messages,
                    Vec::new(),
                    &self.config.augment.system_prompt,
                    self.config.augment.context_budget_chars,
                );
                return (messages, AugmentOutcome::Disabled);
            }
            Some(index) => {
                debug!(phase = RelayPhase::Retrieving.as_str(), index = %index, "Retrieving context");
                let query = request.latest_query().unwrap_or_default();
                match self
                    .retriever
                    .search(query, index, self.config.retriever.top_k)
                    .await
                {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!(
                            index = %index,
                            error = %e,
                            "Retrieval failed, continuing without context"
                        );
                        Vec::new()
                    }
                }
            }
        };

        debug!(
            phase = RelayPhase::Augmenting.as_str(),
            chunk_count = chunks.len(),
            "Augmenting prompt"
        );
        let (messages, outcome) = augment(
            &request.messages,
            chunks,
            &self.config.augment.system_prompt,
            self.config.augment.context_budget_chars,
        );
        info!(outcome = ?outcome, "Prompt augmentation completed");
        (messages, outcome)
    }

    /// Run a streaming request, yielding SSE-encoded frames
    ///
    /// The stream always ends with exactly one terminal frame: done, error,
    /// or abort acknowledgement.
    pub fn run_streaming(
        &self,
        session_id: String,
        request: ChatRequest,
    ) -> impl Stream<Item = String> + Send + 'static {
        let relay = self.clone();

        async_stream::stream! {
            let start = Instant::now();
            let model = request.model.clone();

            let (messages, _outcome) = relay.prepare(&request).await;
            let prompt_tokens = prompt_token_estimate(&messages);

            // Register only once generation is imminent; evicts any prior
            // in-flight request for this session
            let guard = relay.registry.register(&session_id);
            debug!(
                phase = RelayPhase::Generating.as_str(),
                session_id = %session_id,
                request_id = %guard.request_id(),
                "Starting generation"
            );

            let events = match relay
                .backend
                .generate(messages, model.clone(), request.options.clone(), guard.token())
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, kind = e.kind(), "Backend call failed before streaming");
                    yield sse(&ChatFrame::error(&model, e.to_string()));
                    return;
                }
            };
            tokio::pin!(events);

            let mut filter = ReasoningFilter::new();
            let mut visible_text = String::new();
            let mut upstream_metrics: Option<UsageMetrics> = None;
            let mut first_event_at: Option<Instant> = None;
            let mut terminal: Option<&'static str> = None;

            while let Some(event) = events.next().await {
                if first_event_at.is_none() {
                    first_event_at = Some(Instant::now());
                    debug!(phase = RelayPhase::Relaying.as_str(), "First backend event received");
                }

                match event {
                    StreamEvent::ContentDelta(text) => {
                        let out = filter.push(&text);
                        if !out.suppressed.is_empty() {
                            debug!(suppressed = %out.suppressed, "Withheld reasoning block text");
                        }
                        if !out.visible.is_empty() {
                            visible_text.push_str(&out.visible);
                            yield sse(&ChatFrame::delta(&model, out.visible));
                        }
                    }
                    StreamEvent::ToolCall(call) => {
                        let mut frame = ChatFrame::delta(&model, String::new());
                        frame.message = Some(FrameMessage {
                            role: "assistant",
                            content: String::new(),
                            images: None,
                            tool_calls: Some(vec![call]),
                        });
                        yield sse(&frame);
                    }
                    StreamEvent::Image(image) => {
                        let mut frame = ChatFrame::delta(&model, String::new());
                        frame.message = Some(FrameMessage {
                            role: "assistant",
                            content: String::new(),
                            images: Some(vec![image]),
                            tool_calls: None,
                        });
                        yield sse(&frame);
                    }
                    StreamEvent::Metrics(metrics) => {
                        upstream_metrics = Some(metrics);
                    }
                    StreamEvent::Error { kind, message } => {
                        // Same message shaping as the buffered path, so
                        // rate-limit frames carry the retry guidance
                        let err = stream_error(kind, message);
                        warn!(kind = err.kind(), error = %err, "Backend stream failed");
                        yield sse(&ChatFrame::error(&model, err.to_string()));
                        terminal = Some("error");
                        break;
                    }
                    StreamEvent::Done { reason } => {
                        let metrics = finalize_metrics(
                            upstream_metrics.take(),
                            start,
                            first_event_at,
                            prompt_tokens,
                            &visible_text,
                        );
                        yield sse(&ChatFrame::done(&model, reason, metrics));
                        terminal = Some("done");
                        break;
                    }
                    StreamEvent::AbortAck => {
                        info!(
                            phase = RelayPhase::Aborting.as_str(),
                            session_id = %session_id,
                            "Generation aborted by client"
                        );
                        yield sse(&AbortFrame::new());
                        terminal = Some("abort");
                        break;
                    }
                }
            }

            let tail = filter.finish();
            if !tail.suppressed.is_empty() {
                debug!(suppressed = %tail.suppressed, "Withheld unterminated reasoning text");
            }

            match terminal {
                Some("done") => {
                    if let Some(query) = request.latest_query() {
                        relay
                            .sessions
                            .record_exchange(
                                &session_id,
                                ChatMessage::new(ChatRole::User, query),
                                ChatMessage::assistant(visible_text.clone()),
                                &model,
                                request.index.as_deref(),
                                true,
                                relay.config.session.max_context_size,
                            )
                            .await;
                    }
                }
                Some(_) => {}
                None => {
                    // Backend stream ended without a terminal event; the client
                    // still gets exactly one terminal frame
                    warn!("Backend stream ended without terminal event");
                    yield sse(&ChatFrame::error(
                        &model,
                        "backend stream ended unexpectedly".to_string(),
                    ));
                }
            }

            info!(
                phase = RelayPhase::Completed.as_str(),
                session_id = %session_id,
                duration_ms = start.elapsed().as_millis(),
                "Request completed"
            );
        }
    }

    /// Run a non-streaming request
    ///
    /// Drains the backend stream internally, applies the same reasoning
    /// filter, and returns one assembled response.
    pub async fn run_buffered(
        &self,
        session_id: &str,
        request: ChatRequest,
    ) -> Result<BufferedOutcome, AppError> {
        let start = Instant::now();
        let model = request.model.clone();

        let (messages, _outcome) = self.prepare(&request).await;
        let prompt_tokens = prompt_token_estimate(&messages);

        let guard = self.registry.register(session_id);
        debug!(
            phase = RelayPhase::Generating.as_str(),
            session_id = %session_id,
            request_id = %guard.request_id(),
            "Starting buffered generation"
        );

        let mut events = self
            .backend
            .generate(messages, model.clone(), request.options.clone(), guard.token())
            .await?;

        let mut filter = ReasoningFilter::new();
        let mut visible_text = String::new();
        let mut images: Vec<String> = Vec::new();
        let mut tool_calls: Vec<serde_json::Value> = Vec::new();
        let mut upstream_metrics: Option<UsageMetrics> = None;
        let mut first_event_at: Option<Instant> = None;
        let mut done_seen = false;

        while let Some(event) = events.next().await {
            if first_event_at.is_none() {
                first_event_at = Some(Instant::now());
            }

            match event {
                StreamEvent::ContentDelta(text) => {
                    let out = filter.push(&text);
                    if !out.suppressed.is_empty() {
                        debug!(suppressed = %out.suppressed, "Withheld reasoning block text");
                    }
                    visible_text.push_str(&out.visible);
                }
                StreamEvent::ToolCall(call) => tool_calls.push(call),
                StreamEvent::Image(image) => images.push(image),
                StreamEvent::Metrics(metrics) => upstream_metrics = Some(metrics),
                StreamEvent::Error { kind, message } => {
                    let err = stream_error(kind, message);
                    warn!(kind = err.kind(), error = %err, "Backend stream failed");
                    return Err(err);
                }
                StreamEvent::Done { .. } => {
                    done_seen = true;
                    break;
                }
                StreamEvent::AbortAck => {
                    info!(
                        phase = RelayPhase::Aborting.as_str(),
                        session_id = %session_id,
                        "Buffered generation aborted"
                    );
                    return Ok(BufferedOutcome::Aborted);
                }
            }
        }

        let tail = filter.finish();
        if !tail.suppressed.is_empty() {
            debug!(suppressed = %tail.suppressed, "Withheld unterminated reasoning text");
        }

        if !done_seen {
            return Err(AppError::Protocol(
                "backend stream ended unexpectedly".to_string(),
            ));
        }

        let metrics = finalize_metrics(
            upstream_metrics,
            start,
            first_event_at,
            prompt_tokens,
            &visible_text,
        );

        if let Some(query) = request.latest_query() {
            self.sessions
                .record_exchange(
                    session_id,
                    ChatMessage::new(ChatRole::User, query),
                    ChatMessage::assistant(visible_text.clone()),
                    &model,
                    request.index.as_deref(),
                    false,
                    self.config.session.max_context_size,
                )
                .await;
        }

        info!(
            phase = RelayPhase::Completed.as_str(),
            session_id = %session_id,
            duration_ms = start.elapsed().as_millis(),
            "Buffered request completed"
        );

        Ok(BufferedOutcome::Completed(ChatFrame::completed(
            &model,
            visible_text,
            (!images.is_empty()).then_some(images),
            (!tool_calls.is_empty()).then_some(tool_calls),
            metrics,
        )))
    }
}

/// Map a mid-stream backend error onto the error taxonomy
///
/// Both response modes go through this, so frame text and HTTP errors carry
/// identical wording (including the rate-limit retry guidance).
fn stream_error(kind: StreamErrorKind, message: String) -> AppError {
    match kind {
        StreamErrorKind::RateLimited => AppError::RateLimited(message),
        StreamErrorKind::Protocol => AppError::Protocol(message),
        StreamErrorKind::Connection => AppError::BackendUnreachable(message),
    }
}

/// Whitespace-token estimate over the prompt actually sent to the backend
fn prompt_token_estimate(messages: &[ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|m| m.content.split_whitespace().count() as u64)
        .sum()
}

/// Merge upstream metrics with the relay's own measurements
///
/// Upstream values win when present; zeros are filled with wall-clock
/// durations and whitespace-token estimates of the prompt and visible text.
fn finalize_metrics(
    upstream: Option<UsageMetrics>,
    start: Instant,
    first_event_at: Option<Instant>,
    prompt_tokens: u64,
    visible_text: &str,
) -> UsageMetrics {
    let mut metrics = upstream.unwrap_or_default();
    let elapsed = start.elapsed().as_nanos() as u64;
    let load = first_event_at
        .map(|t| t.duration_since(start).as_nanos() as u64)
        .unwrap_or(0);

    if metrics.total_duration == 0 {
        metrics.total_duration = elapsed;
    }
    if metrics.load_duration == 0 {
        metrics.load_duration = load;
    }
    if metrics.prompt_eval_count == 0 {
        metrics.prompt_eval_count = prompt_tokens;
    }
    if metrics.prompt_eval_duration == 0 {
        metrics.prompt_eval_duration = elapsed.saturating_sub(load);
    }
    if metrics.eval_count == 0 {
        metrics.eval_count = visible_text.split_whitespace().count() as u64;
    }
    if metrics.eval_duration == 0 {
        metrics.eval_duration = elapsed.saturating_sub(load);
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_query_skips_empty_content() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![
                ChatMessage::user("real question"),
                ChatMessage::assistant(""),
            ],
            stream: true,
            index: None,
            options: GenerateOptions::default(),
        };
        assert_eq!(request.latest_query(), Some("real question"));
    }

    #[test]
    fn test_finalize_metrics_prefers_upstream_values() {
        let upstream = UsageMetrics {
            total_duration: 999,
            eval_count: 7,
            ..Default::default()
        };
        let metrics = finalize_metrics(Some(upstream), Instant::now(), None, 3, "one two");
        assert_eq!(metrics.total_duration, 999);
        assert_eq!(metrics.eval_count, 7);
        assert_eq!(metrics.prompt_eval_count, 3);
    }

    #[test]
    fn test_finalize_metrics_fallbacks() {
        let metrics = finalize_metrics(None, Instant::now(), None, 2, "one two three");
        assert_eq!(metrics.eval_count, 3);
        assert_eq!(metrics.prompt_eval_count, 2);
    }

    #[test]
    fn test_prompt_token_estimate_counts_whitespace_tokens() {
        let messages = vec![
            ChatMessage::system("you are terse"),
            ChatMessage::user("what is rust"),
            ChatMessage::assistant(""),
        ];
        assert_eq!(prompt_token_estimate(&messages), 6);
    }

    #[test]
    fn test_rate_limit_stream_error_carries_retry_guidance() {
        let err = stream_error(StreamErrorKind::RateLimited, "slow down".into());
        assert!(err.to_string().contains("slow down"));
        assert!(err.to_string().contains("Retry after a short delay"));
    }
}
