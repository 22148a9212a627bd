//! # crag-rag
//!
//! Contextual hybrid retrieval for question answering over a fixed corpus.
//!
//! ## Overview
//!
//! Indexing rewrites every chunk with model-generated context before it is
//! stored in two indexes:
//!
//! - [`Bm25Index`] - lexical ranking, persisted as JSON at `data/<collection>_bm25`
//! - [`SemanticIndex`] - embeddings in a [`VectorStore`], queried with MMR
//!
//! Queries run both indexes concurrently, fuse them with weighted
//! reciprocal rank fusion ([`EnsembleRetriever`]) and pass the candidates
//! through a [`CompressorPipeline`] (redundancy filter, then reranker).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crag_rag::{RagConfig, RagPipeline};
//! use crag_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .language_model(Arc::new(OpenAIChatModel::from_env("gpt-4o")?))
//!     .build()?;
//!
//! pipeline.index("design", &["docs/thinking_in_systems.pdf"]).await?;
//! for result in pipeline.retrieve("design", "¿qué es un sistema complejo?").await? {
//!     println!("{:.3} {}", result.score, result.chunk.text);
//! }
//! ```
//!
//! ## Features
//!
//! - `openai` - OpenAI-compatible embeddings, completions and streamed answers
//! - `rerank-api` - Cohere/Jina-compatible `/rerank` client
//! - `full` - everything

pub mod bm25;
pub mod chat;
pub mod chunking;
pub mod compressor;
pub mod config;
pub mod contextualizer;
pub mod directory;
pub mod document;
pub mod embedding;
pub mod ensemble;
pub mod error;
pub mod generation;
pub mod inmemory;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod mmr;
pub mod pipeline;
pub mod reranker;
pub mod retriever;
pub mod retry;
pub mod semantic;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "rerank-api")]
pub mod rerank_api;

pub use bm25::{Bm25Index, Bm25Params};
pub use chat::ChatSession;
pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, TextSpan};
pub use compressor::{CompressionStage, CompressorPipeline, RedundancyFilter, RerankStage};
pub use config::{ContextualizeConfig, RagConfig, RagConfigBuilder, RetryConfig};
pub use contextualizer::{ContextRequest, Contextualizer};
pub use directory::DirectoryVectorStore;
pub use document::{Chunk, ChunkIdentity, Document, Metadata, SearchResult};
pub use embedding::EmbeddingProvider;
pub use ensemble::EnsembleRetriever;
pub use error::{RagError, Result};
pub use generation::{FragmentStream, GenerationRequest, Generator};
pub use inmemory::InMemoryVectorStore;
pub use llm::{CompletionRequest, LanguageModel};
pub use loader::{SourceFile, SourceKind, load_source};
pub use memory::{ConversationMemory, Turn};
pub use pipeline::{IndexReport, RagPipeline, RagPipelineBuilder};
pub use reranker::Reranker;
pub use retriever::{Bm25Retriever, MmrRetriever, Retriever};
pub use semantic::SemanticIndex;
pub use vectorstore::VectorStore;
