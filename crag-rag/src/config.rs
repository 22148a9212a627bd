//! Configuration for indexing and retrieval.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Bounded retry policy for external model calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every further retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on a single backoff delay.
    pub max_backoff_ms: u64,
    /// Deadline for each individual attempt.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, initial_backoff_ms: 500, max_backoff_ms: 8_000, timeout_secs: 60 }
    }
}

impl RetryConfig {
    /// The per-attempt deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff before retry number `retry` (1-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// Settings for the per-chunk contextualization stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextualizeConfig {
    /// Maximum number of chunks contextualized at the same time.
    pub concurrency: usize,
    /// Language every indexed chunk is normalized to.
    pub target_language: String,
}

impl Default for ContextualizeConfig {
    fn default() -> Self {
        Self { concurrency: 4, target_language: "Spanish".to_string() }
    }
}

/// Configuration parameters for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Results requested from the lexical index.
    pub bm25_k: usize,
    /// BM25 term frequency saturation.
    pub bm25_k1: f32,
    /// BM25 length normalization.
    pub bm25_b: f32,
    /// Results selected from the semantic index.
    pub semantic_k: usize,
    /// Nearest neighbours fetched before MMR selection.
    pub mmr_fetch_k: usize,
    /// MMR trade-off: 1.0 is pure relevance, 0.0 pure diversity.
    pub lambda_mult: f32,
    /// Fusion weight of the semantic retriever.
    pub semantic_weight: f32,
    /// Fusion weight of the lexical retriever.
    pub lexical_weight: f32,
    /// Reciprocal rank fusion smoothing constant.
    pub rrf_c: f32,
    /// Candidates more similar than this to a kept candidate are dropped.
    pub redundancy_threshold: f32,
    /// Maximum number of reranked results handed to generation.
    pub rerank_top_n: Option<usize>,
    /// Reranked results scoring below this are dropped.
    pub relevance_floor: Option<f32>,
    /// Turns kept in conversation memory.
    pub memory_window: usize,
    /// Texts sent per embedding request while building the semantic index.
    pub embedding_batch_size: usize,
    /// Root directory of persisted indexes.
    pub data_dir: PathBuf,
    pub contextualize: ContextualizeConfig,
    pub retry: RetryConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            bm25_k: 10,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            semantic_k: 20,
            mmr_fetch_k: 20,
            lambda_mult: 0.5,
            semantic_weight: 0.5,
            lexical_weight: 0.5,
            rrf_c: 60.0,
            redundancy_threshold: 0.95,
            rerank_top_n: Some(3),
            relevance_floor: None,
            memory_window: 4,
            embedding_batch_size: 64,
            data_dir: PathBuf::from("data"),
            contextualize: ContextualizeConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: RagConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        fn fail(message: String) -> Result<()> {
            Err(RagError::ConfigError(message))
        }

        if self.chunk_size == 0 {
            return fail("chunk_size must be greater than zero".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return fail(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }
        if self.bm25_k == 0 {
            return fail("bm25_k must be greater than zero".to_string());
        }
        if self.semantic_k == 0 {
            return fail("semantic_k must be greater than zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return fail(format!("lambda_mult ({}) must be within [0, 1]", self.lambda_mult));
        }
        for (name, weight) in
            [("semantic_weight", self.semantic_weight), ("lexical_weight", self.lexical_weight)]
        {
            if !weight.is_finite() || weight < 0.0 {
                return fail(format!("{name} ({weight}) must be a non-negative number"));
            }
        }
        if self.semantic_weight + self.lexical_weight <= 0.0 {
            return fail("at least one retriever weight must be positive".to_string());
        }
        if !(self.rrf_c.is_finite() && self.rrf_c >= 0.0) {
            return fail(format!("rrf_c ({}) must be a non-negative number", self.rrf_c));
        }
        if !(0.0..=1.0).contains(&self.redundancy_threshold) {
            return fail(format!(
                "redundancy_threshold ({}) must be within [0, 1]",
                self.redundancy_threshold
            ));
        }
        if self.rerank_top_n == Some(0) {
            return fail("rerank_top_n must be greater than zero when set".to_string());
        }
        if self.memory_window == 0 {
            return fail("memory_window must be greater than zero".to_string());
        }
        if self.embedding_batch_size == 0 {
            return fail("embedding_batch_size must be greater than zero".to_string());
        }
        if self.contextualize.concurrency == 0 {
            return fail("contextualize.concurrency must be greater than zero".to_string());
        }
        if self.retry.timeout_secs == 0 {
            return fail("retry.timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set how many lexical results feed the ensemble.
    pub fn bm25_k(mut self, k: usize) -> Self {
        self.config.bm25_k = k;
        self
    }

    /// Set how many semantic results feed the ensemble.
    pub fn semantic_k(mut self, k: usize) -> Self {
        self.config.semantic_k = k;
        self
    }

    pub fn mmr_fetch_k(mut self, fetch_k: usize) -> Self {
        self.config.mmr_fetch_k = fetch_k;
        self
    }

    /// Set the MMR relevance/diversity trade-off.
    pub fn lambda_mult(mut self, lambda: f32) -> Self {
        self.config.lambda_mult = lambda;
        self
    }

    /// Set the fusion weights of the semantic and lexical retrievers.
    pub fn weights(mut self, semantic: f32, lexical: f32) -> Self {
        self.config.semantic_weight = semantic;
        self.config.lexical_weight = lexical;
        self
    }

    pub fn redundancy_threshold(mut self, threshold: f32) -> Self {
        self.config.redundancy_threshold = threshold;
        self
    }

    pub fn rerank_top_n(mut self, top_n: Option<usize>) -> Self {
        self.config.rerank_top_n = top_n;
        self
    }

    pub fn relevance_floor(mut self, floor: Option<f32>) -> Self {
        self.config.relevance_floor = floor;
        self
    }

    /// Set how many turns the conversation memory keeps.
    pub fn memory_window(mut self, k: usize) -> Self {
        self.config.memory_window = k;
        self
    }

    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the root directory for persisted indexes.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn contextualize(mut self, contextualize: ContextualizeConfig) -> Self {
        self.config.contextualize = contextualize;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any field is out of range, e.g.
    /// `chunk_overlap >= chunk_size` or `lambda_mult` outside `[0, 1]`.
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
