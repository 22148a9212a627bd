//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for tests
//! and ephemeral collections, and serves as the read cache of
//! [`DirectoryVectorStore`](crate::DirectoryVectorStore).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, SearchResult};
use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::vectorstore::{StoredCollection, VectorStore};

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as collection name → chunks in insertion order.
/// All operations are async-safe via `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn contains(&self, name: &str) -> bool {
        self.collections.read().await.contains_key(name)
    }

    pub(crate) async fn insert(&self, collection: StoredCollection) {
        self.collections.write().await.insert(collection.name.clone(), collection);
    }
}

fn missing(collection: &str) -> RagError {
    RagError::MissingIndex {
        collection: collection.to_string(),
        path: PathBuf::from(format!("memory://{collection}")),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn replace_collection(&self, name: &str, dimensions: usize, chunks: Vec<Chunk>) -> Result<()> {
        let collection = StoredCollection::new(name, dimensions, chunks)?;
        self.insert(collection).await;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn dimensions(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections.get(collection).map(|c| c.dimensions).ok_or_else(|| missing(collection))
    }

    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        if embedding.len() != store.dimensions {
            return Err(RagError::EmbeddingMismatch {
                collection: collection.to_string(),
                expected: store.dimensions,
                actual: embedding.len(),
            });
        }

        let mut scored: Vec<SearchResult> = store
            .chunks
            .iter()
            .map(|chunk| SearchResult { chunk: chunk.clone(), score: cosine_similarity(&chunk.embedding, embedding) })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}
