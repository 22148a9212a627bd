//! Retriever trait and the lexical and semantic retrievers over a collection.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bm25::Bm25Index;
use crate::document::SearchResult;
use crate::error::Result;
use crate::semantic::SemanticIndex;

/// Anything that turns a query into a ranked list of chunks.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Ranked results for `query`, best first.
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Lexical retrieval over a loaded [`Bm25Index`].
#[derive(Debug, Clone)]
pub struct Bm25Retriever {
    index: Arc<Bm25Index>,
    k: usize,
}

impl Bm25Retriever {
    pub fn new(index: Arc<Bm25Index>, k: usize) -> Self {
        Self { index, k }
    }
}

#[async_trait]
impl Retriever for Bm25Retriever {
    fn name(&self) -> &str {
        "bm25"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        Ok(self.index.query(query, self.k))
    }
}

/// Semantic retrieval of one collection with MMR selection.
#[derive(Debug, Clone)]
pub struct MmrRetriever {
    index: SemanticIndex,
    collection: String,
    k: usize,
    fetch_k: usize,
    lambda: f32,
}

impl MmrRetriever {
    pub fn new(index: SemanticIndex, collection: impl Into<String>, k: usize, fetch_k: usize, lambda: f32) -> Self {
        Self { index, collection: collection.into(), k, fetch_k, lambda }
    }
}

#[async_trait]
impl Retriever for MmrRetriever {
    fn name(&self) -> &str {
        "mmr"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.index.query(&self.collection, query, self.k, self.fetch_k, self.lambda).await
    }
}
