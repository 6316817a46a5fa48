//! Inference backend adapters
//!
//! Normalizes upstream LLM providers into one streaming generation contract.
//! Each adapter translates its provider's native event shape into the common
//! `StreamEvent` variants; the relay never sees provider-specific wire data.

mod ollama;
pub mod types;

pub use ollama::OllamaBackend;
pub use types::{StreamEvent, StreamErrorKind, UsageMetrics};

use crate::error::AppError;
use crate::message::ChatMessage;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Generation parameters forwarded to the backend
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff
    pub top_k: Option<u32>,
    /// Deterministic seed
    pub seed: Option<i64>,
}

/// A finite, non-restartable stream of backend events
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Uniform streaming-generation contract over upstream LLM providers
///
/// Implementations hold one open network connection for the stream's lifetime
/// and must release it on completion, error, or cancellation. When the
/// cancellation token fires mid-stream the sequence ends within one network
/// read cycle and emits no further `ContentDelta` events.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Start a generation and return its event stream
    ///
    /// # Errors
    /// * `AppError::Validation` - `messages` is empty
    /// * `AppError::BackendUnreachable` - upstream could not be contacted
    /// * `AppError::RateLimited` - upstream returned a rate-limit status
    /// * `AppError::Timeout` - connect timeout elapsed
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        model: String,
        options: GenerateOptions,
        token: CancellationToken,
    ) -> Result<EventStream, AppError>;
}
