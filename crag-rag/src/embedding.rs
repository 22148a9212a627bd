//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// The same provider (model and dimensionality) must be used when a semantic
/// index is built and when it is queried. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use crag_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Embed `texts` in batches of `batch_size`, checking that every vector has
/// the provider's advertised dimensionality.
///
/// # Errors
///
/// Returns [`RagError::EmbeddingMismatch`] if a vector has the wrong length and
/// [`RagError::EmbeddingError`] if the provider returns the wrong number of vectors.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    collection: &str,
    texts: &[&str],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let expected = provider.dimensions();
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        debug!(collection, batch_size = batch.len(), "embedding batch");
        let vectors = provider.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(RagError::EmbeddingError {
                provider: "batch".to_string(),
                message: format!("requested {} embeddings, received {}", batch.len(), vectors.len()),
            });
        }
        for vector in vectors {
            if vector.len() != expected {
                return Err(RagError::EmbeddingMismatch {
                    collection: collection.to_string(),
                    expected,
                    actual: vector.len(),
                });
            }
            embeddings.push(vector);
        }
    }

    Ok(embeddings)
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
