//! Weighted Reciprocal Rank Fusion: score = Σ weight_i / (c + rank_i)
//!
//! Fuses rankings of retrievers whose raw scores are not comparable. Ranks
//! are 1-based; a chunk retrieved by several retrievers sums its
//! contributions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, error};

use crate::document::{ChunkIdentity, SearchResult};
use crate::error::{RagError, Result};
use crate::retriever::Retriever;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_C: f64 = 60.0;

/// Fuse ranked lists with per-list weights.
///
/// Chunks are identified by text and metadata. Output is sorted by fused
/// score, descending; equal scores keep first-appearance order (list order,
/// then rank). The first occurrence of a chunk is the one returned.
pub fn weighted_rrf(lists: &[(Vec<SearchResult>, f32)], c: f64) -> Vec<SearchResult> {
    let mut positions: HashMap<ChunkIdentity, usize> = HashMap::new();
    let mut fused: Vec<(SearchResult, f64)> = Vec::new();

    for (results, weight) in lists {
        for (rank0, result) in results.iter().enumerate() {
            let contribution = f64::from(*weight) / (c + (rank0 + 1) as f64);
            match positions.get(&result.chunk.identity()) {
                Some(&at) => fused[at].1 += contribution,
                None => {
                    positions.insert(result.chunk.identity(), fused.len());
                    fused.push((result.clone(), contribution));
                }
            }
        }
    }

    // Stable: ties keep first-appearance order.
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
        .into_iter()
        .map(|(result, score)| SearchResult { score: score as f32, ..result })
        .collect()
}

/// Runs weighted retrievers concurrently and fuses their rankings.
pub struct EnsembleRetriever {
    retrievers: Vec<(Arc<dyn Retriever>, f32)>,
    c: f64,
}

impl EnsembleRetriever {
    /// Fuse `retrievers` with their weights.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if there are no retrievers, a weight
    /// is negative or not finite, or the weights sum to zero.
    pub fn new(retrievers: Vec<(Arc<dyn Retriever>, f32)>, c: f64) -> Result<Self> {
        if retrievers.is_empty() {
            return Err(RagError::ConfigError("ensemble needs at least one retriever".to_string()));
        }
        if retrievers.iter().any(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(RagError::ConfigError("ensemble weights must be finite and non-negative".to_string()));
        }
        if retrievers.iter().map(|(_, w)| w).sum::<f32>() <= 0.0 {
            return Err(RagError::ConfigError("ensemble weights must have a positive sum".to_string()));
        }
        Ok(Self { retrievers, c })
    }
}

#[async_trait]
impl Retriever for EnsembleRetriever {
    fn name(&self) -> &str {
        "ensemble"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let lists = try_join_all(self.retrievers.iter().map(|(retriever, weight)| async move {
            let results = retriever.retrieve(query).await.inspect_err(|e| {
                error!(retriever = retriever.name(), error = %e, "sub-retriever failed");
            })?;
            debug!(retriever = retriever.name(), result_count = results.len(), "sub-retriever finished");
            Ok::<_, RagError>((results, *weight))
        }))
        .await?;

        Ok(weighted_rrf(&lists, self.c))
    }
}
