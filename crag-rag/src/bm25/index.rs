use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Bm25Params, idf, term_score, tokenize};
use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};

/// One chunk's occurrence count of a term.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posting {
    /// Position of the chunk in [`Bm25Index::chunks`].
    pub chunk: usize,
    pub term_frequency: usize,
}

/// Document frequency and postings list of a term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TermEntry {
    pub document_frequency: usize,
    /// Sorted by chunk position.
    pub postings: Vec<Posting>,
}

/// An immutable BM25 inverted index over a collection's chunks.
///
/// The struct is its own persisted format. Terms are kept in a `BTreeMap`
/// so serializing the same chunks always yields the same bytes apart from
/// `built_at`. There is no incremental update; rebuild from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Index {
    version: u32,
    params: Bm25Params,
    built_at: DateTime<Utc>,
    postings: BTreeMap<String, TermEntry>,
    chunk_lengths: Vec<usize>,
    chunks: Vec<Chunk>,
}

impl Bm25Index {
    /// Format version written by this build.
    pub const CURRENT_VERSION: u32 = 1;

    /// Build an index over `chunks`, in order. Embeddings are not stored.
    pub fn build(chunks: &[Chunk], params: Bm25Params) -> Self {
        let mut postings: BTreeMap<String, TermEntry> = BTreeMap::new();
        let mut chunk_lengths = Vec::with_capacity(chunks.len());
        let mut stored = Vec::with_capacity(chunks.len());

        for (position, chunk) in chunks.iter().enumerate() {
            let tokens = tokenize(&chunk.text);
            chunk_lengths.push(tokens.len());

            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *term_freqs.entry(token).or_insert(0) += 1;
            }
            for (term, term_frequency) in term_freqs {
                let entry = postings
                    .entry(term)
                    .or_insert_with(|| TermEntry { document_frequency: 0, postings: Vec::new() });
                entry.document_frequency += 1;
                entry.postings.push(Posting { chunk: position, term_frequency });
            }

            stored.push(Chunk { embedding: Vec::new(), ..chunk.clone() });
        }

        Self {
            version: Self::CURRENT_VERSION,
            params,
            built_at: Utc::now(),
            postings,
            chunk_lengths,
            chunks: stored,
        }
    }

    /// Top `k` chunks by BM25 score, descending; ties keep insertion order.
    ///
    /// Chunks that match no query term are never returned.
    pub fn query(&self, text: &str, k: usize) -> Vec<SearchResult> {
        if self.chunks.is_empty() || k == 0 {
            return Vec::new();
        }

        let num_docs = self.chunks.len();
        let avg_len = self.chunk_lengths.iter().sum::<usize>() as f32 / num_docs as f32;
        let mut scores = vec![0.0f32; num_docs];
        let mut matched = vec![false; num_docs];

        for token in tokenize(text) {
            let Some(entry) = self.postings.get(&token) else {
                continue;
            };
            let idf_value = idf(num_docs, entry.document_frequency);
            for posting in &entry.postings {
                scores[posting.chunk] += term_score(
                    posting.term_frequency,
                    self.chunk_lengths[posting.chunk],
                    avg_len,
                    idf_value,
                    &self.params,
                );
                matched[posting.chunk] = true;
            }
        }

        let mut ranked: Vec<usize> = (0..num_docs).filter(|&i| matched[i]).collect();
        // Stable sort: equal scores stay in insertion order.
        ranked.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .take(k)
            .map(|i| SearchResult { chunk: self.chunks[i].clone(), score: scores[i] })
            .collect()
    }

    /// Check internal consistency after deserialization.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.version != Self::CURRENT_VERSION {
            return Err(RagError::IndexFormat(format!(
                "unsupported lexical index version {} (expected {})",
                self.version,
                Self::CURRENT_VERSION
            )));
        }
        if self.chunk_lengths.len() != self.chunks.len() {
            return Err(RagError::IndexFormat(format!(
                "{} chunk lengths for {} chunks",
                self.chunk_lengths.len(),
                self.chunks.len()
            )));
        }
        for (term, entry) in &self.postings {
            if entry.postings.len() != entry.document_frequency
                || entry.postings.iter().any(|p| p.chunk >= self.chunks.len())
            {
                return Err(RagError::IndexFormat(format!("corrupt postings for term '{term}'")));
            }
        }
        Ok(())
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// The indexed chunks, in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of distinct terms.
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    /// Number of chunks containing `term` (already tokenized).
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, |e| e.document_frequency)
    }
}
