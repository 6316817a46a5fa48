//! HTTP retriever client
//!
//! Client for the external retriever service's similarity-search endpoint.
//! Applies the configured relevance threshold to the results before handing
//! them to the augmentation stage.

use crate::error::AppError;
use crate::retrieval::{RetrievedChunk, Retriever};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    index: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RetrievedChunk>,
}

/// Retriever backed by an HTTP similarity-search service
pub struct HttpRetriever {
    client: reqwest::Client,
    base_url: String,
    score_threshold: f32,
    timeout: Duration,
}

impl HttpRetriever {
    /// Create a new retriever client using a shared HTTP client
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        score_threshold: f32,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            score_threshold,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(
        &self,
        query: &str,
        index: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AppError> {
        let url = format!("{}/api/search", self.base_url);
        let request = SearchRequest {
            query,
            index,
            top_k,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Retrieval(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(AppError::Retrieval(format!(
                "retriever returned status {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("malformed retriever response: {}", e)))?;

        let total = parsed.results.len();
        let chunks: Vec<RetrievedChunk> = parsed
            .results
            .into_iter()
            .filter(|c| c.score >= self.score_threshold)
            .collect();

        debug!(
            index = %index,
            returned = total,
            above_threshold = chunks.len(),
            threshold = self.score_threshold,
            "Retrieval completed"
        );

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn retriever(url: &str, threshold: f32) -> HttpRetriever {
        HttpRetriever::new(reqwest::Client::new(), url.to_string(), threshold, 5)
    }

    #[tokio::test]
    #[serial]
    async fn test_search_filters_below_threshold() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/search")
            .with_status(200)
            .with_body(
                r#"{"results":[
                    {"text":"a","score":0.9,"metadata":{}},
                    {"text":"b","score":0.3,"metadata":{}},
                    {"text":"c","score":0.7,"metadata":{}}
                ]}"#,
            )
            .create_async()
            .await;

        let retriever = retriever(&server.url(), 0.5);
        let chunks = retriever.search("q", "default", 5).await.unwrap();
        mock.assert_async().await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a");
        assert_eq!(chunks[1].text, "c");
    }

    #[tokio::test]
    #[serial]
    async fn test_search_empty_result_is_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/search")
            .with_status(200)
            .with_body(r#"{"results":[]}"#)
            .create_async()
            .await;

        let retriever = retriever(&server.url(), 0.0);
        let chunks = retriever.search("q", "default", 5).await.unwrap();
        mock.assert_async().await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_search_upstream_error_is_retrieval_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/search")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let retriever = retriever(&server.url(), 0.0);
        let result = retriever.search("q", "default", 5).await;
        mock.assert_async().await;
        assert!(matches!(result, Err(AppError::Retrieval(_))));
    }

    #[tokio::test]
    async fn test_search_unreachable_is_retrieval_error() {
        let retriever = retriever("http://127.0.0.1:1", 0.0);
        let result = retriever.search("q", "default", 5).await;
        assert!(matches!(result, Err(AppError::Retrieval(_))));
    }
}
