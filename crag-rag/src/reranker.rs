//! Reranker trait for re-scoring retrieval candidates.

use async_trait::async_trait;

use crate::document::SearchResult;
use crate::error::Result;

/// A reranker that jointly scores each (query, candidate) pair.
///
/// Implementations are typically cross-encoder services. A reranker is
/// called once per query with every surviving candidate and returns them
/// with reranker scores; it may return fewer candidates than it was given,
/// in any order. Sorting and truncation happen in
/// [`RerankStage`](crate::compressor::RerankStage).
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Score `results` against `query`.
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}
