//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the two halves of the system:
//!
//! - **index**: load → chunk → contextualize → {lexical index, semantic index}
//! - **retrieve**: {semantic, lexical} in parallel → weighted RRF →
//!   redundancy filter → rerank
//!
//! # Example
//!
//! ```rust,ignore
//! use crag_rag::{RagPipeline, RagConfig};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .language_model(Arc::new(my_llm))
//!     .reranker(Arc::new(my_reranker))
//!     .build()?;
//!
//! pipeline.index("design", &["data/thinking_in_systems.pdf"]).await?;
//! let results = pipeline.retrieve("design", "¿qué es un sistema complejo?").await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::bm25::{Bm25Index, Bm25Params, lexical_index_path, load_lexical_index, stage_lexical_index};
use crate::chunking::{Chunker, RecursiveChunker};
use crate::compressor::{CompressorPipeline, RedundancyFilter, RerankStage};
use crate::config::RagConfig;
use crate::contextualizer::Contextualizer;
use crate::directory::DirectoryVectorStore;
use crate::document::{Chunk, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::ensemble::EnsembleRetriever;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::loader::{SourceFile, load_source};
use crate::reranker::Reranker;
use crate::retriever::{Bm25Retriever, MmrRetriever, Retriever};
use crate::semantic::SemanticIndex;
use crate::vectorstore::VectorStore;

/// Directory under `data_dir` holding the semantic indexes.
pub const SEMANTIC_DIR: &str = "chroma_db";

/// Check that a collection name is non-empty ASCII alphanumerics, `_` or `-`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(RagError::InvalidCollection(name.to_string()));
    }
    Ok(())
}

/// Summary of a completed indexing run.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReport {
    pub collection: String,
    pub sources: usize,
    pub pages: usize,
    pub chunks: usize,
    /// Where the lexical index was written.
    pub lexical_path: PathBuf,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    language_model: Option<Arc<dyn LanguageModel>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Location of the lexical index of `collection`.
    pub fn lexical_path(&self, collection: &str) -> PathBuf {
        lexical_index_path(&self.config.data_dir, collection)
    }

    fn semantic_index(&self) -> SemanticIndex {
        SemanticIndex::new(self.vector_store.clone(), self.embedding_provider.clone())
    }

    /// Load, contextualize and index `paths` as `collection`, replacing any
    /// previous indexes of that collection.
    ///
    /// The run is all-or-nothing: a failure in any step leaves the existing
    /// indexes in place.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if no language model is configured,
    /// and propagates load, contextualization and storage errors.
    #[instrument(skip_all, fields(collection = %collection))]
    pub async fn index<P: AsRef<Path>>(&self, collection: &str, paths: &[P]) -> Result<IndexReport> {
        validate_collection_name(collection)?;

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let source = load_source(path).await.inspect_err(|e| {
                error!(path = %path.as_ref().display(), error = %e, "failed to load source");
            })?;
            sources.push(source);
        }
        self.index_sources(collection, sources).await
    }

    /// Contextualize and index already-loaded sources.
    #[instrument(skip_all, fields(collection = %collection))]
    pub async fn index_sources(&self, collection: &str, sources: Vec<SourceFile>) -> Result<IndexReport> {
        validate_collection_name(collection)?;
        let llm = self.language_model.clone().ok_or_else(|| {
            RagError::ConfigError("a language model is required for contextualization".to_string())
        })?;

        let pages: usize = sources.iter().map(|s| s.pages.len()).sum();
        let requests: Vec<_> =
            sources.iter().flat_map(|source| source.context_requests(self.chunker.as_ref())).collect();
        info!(source_count = sources.len(), page_count = pages, chunk_count = requests.len(), "chunked sources");

        let contextualizer =
            Contextualizer::new(llm, self.config.contextualize.clone(), self.config.retry.clone());
        let chunks = contextualizer.contextualize_all(requests).await.inspect_err(|e| {
            error!(error = %e, "contextualization failed, indexes left untouched");
        })?;

        let mut report = self.index_chunks(collection, chunks).await?;
        report.sources = sources.len();
        report.pages = pages;
        Ok(report)
    }

    /// Build both indexes of `collection` from contextualized chunks.
    ///
    /// The lexical index is staged on disk before the semantic collection is
    /// replaced and published only once that succeeds, so a failed run
    /// leaves both previous indexes in place.
    #[instrument(skip_all, fields(collection = %collection, chunk_count = chunks.len()))]
    pub async fn index_chunks(&self, collection: &str, chunks: Vec<Chunk>) -> Result<IndexReport> {
        validate_collection_name(collection)?;

        let params = Bm25Params { k1: self.config.bm25_k1, b: self.config.bm25_b };
        let lexical = Bm25Index::build(&chunks, params);
        let chunk_count = chunks.len();

        let lexical_path = self.lexical_path(collection);
        let staged = stage_lexical_index(&lexical, &lexical_path).await.map_err(|e| {
            error!(path = %lexical_path.display(), error = %e, "failed to stage lexical index");
            RagError::PipelineError(format!("failed to save lexical index for '{collection}': {e}"))
        })?;

        if let Err(e) = self.semantic_index().build(collection, chunks, self.config.embedding_batch_size).await {
            error!(error = %e, "semantic index build failed");
            staged.discard().await;
            return Err(e);
        }

        let lexical_path = staged.commit().await.map_err(|e| {
            error!(path = %lexical_path.display(), error = %e, "failed to publish lexical index");
            RagError::PipelineError(format!("failed to save lexical index for '{collection}': {e}"))
        })?;

        info!(chunk_count, vocabulary = lexical.vocabulary_size(), "indexes built");
        Ok(IndexReport {
            collection: collection.to_string(),
            sources: 0,
            pages: 0,
            chunks: chunk_count,
            lexical_path,
        })
    }

    /// Retrieve the final ranked chunks for `query` from `collection`.
    ///
    /// An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::MissingIndex`] if either index is absent and
    /// propagates retrieval, embedding and rerank failures.
    #[instrument(name = "rag.retrieve", skip_all, fields(collection = %collection))]
    pub async fn retrieve(&self, collection: &str, query: &str) -> Result<Vec<SearchResult>> {
        validate_collection_name(collection)?;

        let lexical = load_lexical_index(&self.lexical_path(collection), collection).await.inspect_err(|e| {
            error!(error = %e, "lexical index unavailable");
        })?;

        let semantic: Arc<dyn Retriever> = Arc::new(MmrRetriever::new(
            self.semantic_index(),
            collection,
            self.config.semantic_k,
            self.config.mmr_fetch_k,
            self.config.lambda_mult,
        ));
        let lexical: Arc<dyn Retriever> = Arc::new(Bm25Retriever::new(Arc::new(lexical), self.config.bm25_k));
        let ensemble = EnsembleRetriever::new(
            vec![(semantic, self.config.semantic_weight), (lexical, self.config.lexical_weight)],
            f64::from(self.config.rrf_c),
        )?;

        let candidates = ensemble.retrieve(query).await?;
        let candidate_count = candidates.len();
        let results = self.compressor().compress(query, candidates).await?;

        info!(candidate_count, result_count = results.len(), "query completed");
        Ok(results)
    }

    fn compressor(&self) -> CompressorPipeline {
        let pipeline = CompressorPipeline::new()
            .with_stage(RedundancyFilter::new(self.embedding_provider.clone(), self.config.redundancy_threshold));
        match &self.reranker {
            Some(reranker) => pipeline.with_stage(RerankStage::new(
                reranker.clone(),
                self.config.rerank_top_n,
                self.config.relevance_floor,
            )),
            None => pipeline,
        }
    }

    /// Delete both indexes of `collection`.
    pub async fn delete_collection(&self, collection: &str) -> Result<()> {
        validate_collection_name(collection)?;
        self.vector_store.delete_collection(collection).await.map_err(|e| {
            error!(collection, error = %e, "failed to delete collection");
            RagError::PipelineError(format!("failed to delete collection '{collection}': {e}"))
        })?;
        match tokio::fs::remove_file(self.lexical_path(collection)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider` is required. The vector store defaults to a
/// [`DirectoryVectorStore`] under `<data_dir>/chroma_db` and the chunker to a
/// [`RecursiveChunker`] sized by the config. Indexing needs a language model;
/// retrieval without a reranker skips the rerank stage.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the model used to contextualize chunks.
    pub fn language_model(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(llm);
        self
    }

    /// Set the reranker of the final compression stage.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedding provider is missing
    /// or the config is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self.vector_store.unwrap_or_else(|| {
            Arc::new(DirectoryVectorStore::open(config.data_dir.join(SEMANTIC_DIR))) as Arc<dyn VectorStore>
        });
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)) as Arc<dyn Chunker>
        });

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_store,
            chunker,
            language_model: self.language_model,
            reranker: self.reranker,
        })
    }
}
