//! Cross-encoder reranking over a Cohere/Jina-compatible `/rerank` endpoint.
//!
//! This module is only available when the `rerank-api` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::RetryConfig;
use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::reranker::Reranker;
use crate::retry::with_retry;

/// A [`Reranker`] calling `POST {base_url}/rerank`.
///
/// One request scores every candidate; failed requests are retried under the
/// configured [`RetryConfig`].
///
/// # Example
///
/// ```rust,ignore
/// use crag_rag::rerank_api::RerankApiReranker;
///
/// let reranker = RerankApiReranker::new("https://api.cohere.com/v2", "key", "rerank-v3.5")?;
/// let reranked = reranker.rerank("query", candidates).await?;
/// ```
pub struct RerankApiReranker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl RerankApiReranker {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::RerankerError {
                reranker: "RerankApi".into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            retry: RetryConfig::default(),
        })
    }

    /// Create a reranker from `RERANK_BASE_URL`, `RERANK_API_KEY` and `RERANK_MODEL`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).ok().filter(|v| !v.is_empty()).ok_or_else(|| RagError::RerankerError {
                reranker: "RerankApi".into(),
                message: format!("{name} environment variable not set"),
            })
        };
        Self::new(var("RERANK_BASE_URL")?, var("RERANK_API_KEY")?, var("RERANK_MODEL")?)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn request_scores(&self, body: &RerankRequest<'_>) -> Result<Vec<RerankScore>> {
        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.failure(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(reranker = %self.model, %status, "rerank API error");
            return Err(self.status_error(status, &detail));
        }

        let parsed: RerankResponse =
            response.json().await.map_err(|e| self.failure(format!("failed to parse response: {e}")))?;
        Ok(parsed.results)
    }

    /// Client errors other than timeouts and rate limits cannot succeed on retry.
    fn status_error(&self, status: reqwest::StatusCode, detail: &str) -> RagError {
        let permanent = status.is_client_error()
            && status != reqwest::StatusCode::TOO_MANY_REQUESTS
            && status != reqwest::StatusCode::REQUEST_TIMEOUT;
        if permanent {
            RagError::ConfigError(format!("rerank service {} rejected the request ({status}): {detail}", self.model))
        } else {
            self.failure(format!("API returned {status}: {detail}"))
        }
    }

    fn failure(&self, message: String) -> RagError {
        RagError::RerankerError { reranker: self.model.clone(), message }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    relevance_score: f32,
}

#[async_trait]
impl Reranker for RerankApiReranker {
    fn name(&self) -> &str {
        &self.model
    }

    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        if results.is_empty() {
            return Ok(results);
        }

        let body = RerankRequest {
            model: &self.model,
            query,
            documents: results.iter().map(|r| r.chunk.text.as_str()).collect(),
            top_n: results.len(),
        };
        let body = &body;
        let scores = with_retry("rerank", &self.retry, move || self.request_scores(body)).await?;
        debug!(reranker = %self.model, candidates = results.len(), scored = scores.len(), "rerank response");

        let mut slots: Vec<Option<SearchResult>> = results.into_iter().map(Some).collect();
        let mut reranked = Vec::with_capacity(scores.len());
        for score in scores {
            if let Some(mut result) = slots.get_mut(score.index).and_then(Option::take) {
                result.score = score.relevance_score;
                reranked.push(result);
            }
        }
        Ok(reranked)
    }
}
