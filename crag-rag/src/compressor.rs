//! Post-retrieval compression: redundancy filtering followed by reranking.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::document::SearchResult;
use crate::embedding::{EmbeddingProvider, cosine_similarity};
use crate::error::{RagError, Result};
use crate::reranker::Reranker;

/// One step of a [`CompressorPipeline`].
#[async_trait]
pub trait CompressionStage: Send + Sync {
    fn name(&self) -> &str;

    /// Transform `candidates`, returning no more than it received.
    async fn compress(&self, query: &str, candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}

/// Drops candidates nearly identical to an earlier-ranked one.
pub struct RedundancyFilter {
    embedder: Arc<dyn EmbeddingProvider>,
    threshold: f32,
}

impl RedundancyFilter {
    /// Candidates with cosine similarity above `threshold` to a kept one are dropped.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, threshold: f32) -> Self {
        Self { embedder, threshold }
    }
}

#[async_trait]
impl CompressionStage for RedundancyFilter {
    fn name(&self) -> &str {
        "redundancy_filter"
    }

    async fn compress(&self, _query: &str, mut candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        let dimensions = self.embedder.dimensions();
        let missing: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, r)| r.chunk.embedding.len() != dimensions)
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let texts: Vec<&str> = missing.iter().map(|&i| candidates[i].chunk.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != missing.len() {
                return Err(RagError::EmbeddingError {
                    provider: "batch".to_string(),
                    message: format!("requested {} embeddings, received {}", missing.len(), embeddings.len()),
                });
            }
            for (i, embedding) in missing.into_iter().zip(embeddings) {
                candidates[i].chunk.embedding = embedding;
            }
        }

        let before = candidates.len();
        let mut kept: Vec<SearchResult> = Vec::with_capacity(before);
        for candidate in candidates {
            let redundant = kept
                .iter()
                .any(|k| cosine_similarity(&k.chunk.embedding, &candidate.chunk.embedding) > self.threshold);
            if !redundant {
                kept.push(candidate);
            }
        }

        debug!(before, after = kept.len(), threshold = self.threshold, "redundancy filter applied");
        Ok(kept)
    }
}

/// Reorders candidates by reranker score and keeps the best ones.
pub struct RerankStage {
    reranker: Arc<dyn Reranker>,
    top_n: Option<usize>,
    relevance_floor: Option<f32>,
}

impl RerankStage {
    pub fn new(reranker: Arc<dyn Reranker>, top_n: Option<usize>, relevance_floor: Option<f32>) -> Self {
        Self { reranker, top_n, relevance_floor }
    }
}

#[async_trait]
impl CompressionStage for RerankStage {
    fn name(&self) -> &str {
        "rerank"
    }

    async fn compress(&self, query: &str, candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        let before = candidates.len();
        let mut reranked = self.reranker.rerank(query, candidates).await?;
        reranked.truncate(before);

        reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(floor) = self.relevance_floor {
            reranked.retain(|r| r.score >= floor);
        }
        if let Some(top_n) = self.top_n {
            reranked.truncate(top_n);
        }

        debug!(reranker = self.reranker.name(), before, after = reranked.len(), "rerank applied");
        Ok(reranked)
    }
}

/// Runs compression stages strictly in order.
#[derive(Default)]
pub struct CompressorPipeline {
    stages: Vec<Box<dyn CompressionStage>>,
}

impl CompressorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn with_stage(mut self, stage: impl CompressionStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Apply every stage. An empty candidate list is returned without calling any stage.
    pub async fn compress(&self, query: &str, mut candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        for stage in &self.stages {
            if candidates.is_empty() {
                break;
            }
            candidates = stage.compress(query, candidates).await?;
        }
        Ok(candidates)
    }
}
