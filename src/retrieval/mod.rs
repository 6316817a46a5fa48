//! Retriever contract
//!
//! The chunk store is an external capability: given a query and an index
//! name it returns scored text chunks. The gateway only consumes this
//! interface; indexing and vector math live in the retriever service.

mod http;

pub use http::HttpRetriever;

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A retrieval-sized fragment of a source document
///
/// Produced fresh per query; never persisted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text
    pub text: String,
    /// Relevance score assigned by the retriever
    pub score: f32,
    /// Source metadata, e.g. file path and chunk offset
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Similarity-search contract consumed by the relay
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return chunks relevant to `query` from `index`, best first
    ///
    /// Implementations apply their configured relevance threshold before
    /// returning; an empty result is a success, not an error.
    async fn search(
        &self,
        query: &str,
        index: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AppError>;
}
