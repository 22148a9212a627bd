//! Semantic index: embeddings in a [`VectorStore`] queried with MMR.

use std::sync::Arc;

use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::embedding::{EmbeddingProvider, cosine_similarity, embed_all};
use crate::error::{RagError, Result};
use crate::mmr::maximal_marginal_relevance;
use crate::vectorstore::VectorStore;

/// Couples an embedding provider with the store holding its vectors.
///
/// The same provider must build and query a collection; a dimensionality
/// change is reported as [`RagError::EmbeddingMismatch`].
#[derive(Clone)]
pub struct SemanticIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SemanticIndex {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed `chunks` and replace the collection with them.
    pub async fn build(&self, collection: &str, mut chunks: Vec<Chunk>, batch_size: usize) -> Result<usize> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = embed_all(self.embedder.as_ref(), collection, &texts, batch_size).await?;
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        let count = chunks.len();
        let dimensions = self.embedder.dimensions();
        self.store.replace_collection(collection, dimensions, chunks).await?;
        info!(collection, chunk_count = count, dimensions, "semantic index built");
        Ok(count)
    }

    /// Top `k` chunks chosen by MMR from the `max(fetch_k, k)` nearest neighbours.
    ///
    /// Results are in selection order, scored by cosine similarity to the query.
    pub async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<SearchResult>> {
        let expected = self.store.dimensions(collection).await?;
        let query = self.embedder.embed(text).await?;
        if query.len() != expected {
            return Err(RagError::EmbeddingMismatch {
                collection: collection.to_string(),
                expected,
                actual: query.len(),
            });
        }

        let candidates = self.store.search(collection, &query, fetch_k.max(k)).await?;
        let vectors: Vec<&[f32]> = candidates.iter().map(|r| r.chunk.embedding.as_slice()).collect();
        let picks = maximal_marginal_relevance(&query, &vectors, lambda, k);
        debug!(collection, fetched = candidates.len(), selected = picks.len(), "mmr selection");

        Ok(picks
            .into_iter()
            .map(|i| {
                let chunk = candidates[i].chunk.clone();
                let score = cosine_similarity(&query, &chunk.embedding);
                SearchResult { chunk, score }
            })
            .collect())
    }
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex").field("dimensions", &self.embedder.dimensions()).finish_non_exhaustive()
    }
}
