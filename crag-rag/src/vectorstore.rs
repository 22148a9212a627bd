//! Vector store trait for storing and searching chunk embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};

/// A storage backend for embedded chunks with cosine similarity search.
///
/// Collections are written as a whole: [`replace_collection`](VectorStore::replace_collection)
/// swaps in a complete new set of chunks, so readers observe either the old
/// or the new collection, never a mix.
///
/// # Example
///
/// ```rust,ignore
/// use crag_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.replace_collection("docs", 384, chunks).await?;
/// let results = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace the named collection with `chunks`, creating it if needed.
    ///
    /// Every chunk must carry an embedding of `dimensions` values.
    async fn replace_collection(&self, name: &str, dimensions: usize, chunks: Vec<Chunk>) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Dimensionality recorded for the collection.
    async fn dimensions(&self, collection: &str) -> Result<usize>;

    /// Search for the `top_k` most similar chunks to the given embedding.
    ///
    /// Returns results ordered by descending cosine similarity, ties in
    /// insertion order. Returned chunks keep their embeddings.
    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;
}

/// A collection as held in memory and persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCollection {
    pub name: String,
    pub dimensions: usize,
    pub chunks: Vec<Chunk>,
}

impl StoredCollection {
    /// Assemble a collection, rejecting chunks with the wrong dimensionality.
    pub fn new(name: &str, dimensions: usize, chunks: Vec<Chunk>) -> Result<Self> {
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dimensions) {
            return Err(RagError::EmbeddingMismatch {
                collection: name.to_string(),
                expected: dimensions,
                actual: bad.embedding.len(),
            });
        }
        Ok(Self { name: name.to_string(), dimensions, chunks })
    }
}
