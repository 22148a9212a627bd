//! Error types for the `crag-rag` crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while indexing or retrieving.
#[derive(Debug, Error)]
pub enum RagError {
    /// A lexical or semantic index for the collection does not exist.
    #[error("index for collection '{collection}' not found at {}", path.display())]
    MissingIndex {
        /// The collection that was queried.
        collection: String,
        /// The location the index was expected at.
        path: PathBuf,
    },

    /// An embedding does not match the dimensionality of the stored index.
    #[error(
        "embedding dimensionality mismatch in collection '{collection}': index has {expected}, got {actual}"
    )]
    EmbeddingMismatch {
        /// The collection whose index was touched.
        collection: String,
        /// Dimensionality recorded by the index.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },

    /// An external model call exhausted its retry budget.
    #[error("{operation} failed after {attempts} attempt(s): {message}")]
    GenerationCallError {
        /// The logical operation (e.g. `contextualize`, `rerank`).
        operation: String,
        /// How many attempts were made.
        attempts: u32,
        /// The last error observed.
        message: String,
    },

    /// A single language model call failed.
    #[error("LLM error ({provider}): {message}")]
    LlmError {
        /// The model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A single attempt exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The logical operation that timed out.
        operation: String,
        /// The per-attempt deadline.
        timeout: Duration,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// The file extension is not one the loader understands.
    #[error("unsupported source file: {}", .0.display())]
    UnsupportedSource(PathBuf),

    /// A source file could not be read or parsed.
    #[error("failed to load {}: {message}", path.display())]
    DocumentLoad {
        /// The file being loaded.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The collection name is not usable as a storage key.
    #[error("invalid collection name '{0}'")]
    InvalidCollection(String),

    /// A persisted index could not be interpreted.
    #[error("index format error: {0}")]
    IndexFormat(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether another attempt of the same call may succeed.
    ///
    /// Dimensionality mismatches, missing indexes and configuration errors
    /// are setup bugs and are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::LlmError { .. }
                | RagError::Timeout { .. }
                | RagError::RerankerError { .. }
                | RagError::EmbeddingError { .. }
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
