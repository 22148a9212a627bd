//! BM25 lexical index.
//!
//! Complements the semantic index with exact-term matching. Scores use the
//! Okapi BM25 function:
//!
//! ```text
//! score(D, Q) = Σ IDF(q) * (f(q, D) * (k1 + 1)) / (f(q, D) + k1 * (1 - b + b * |D| / avgdl))
//! IDF(q)      = ln((N - df(q) + 0.5) / (df(q) + 0.5) + 1)
//! ```
//!
//! The built index is persisted with [`storage`] as plain JSON (postings,
//! document frequencies and the chunk array) so any tool can read it.

mod index;
pub mod storage;

pub use index::{Bm25Index, Posting, TermEntry};
pub use storage::{
    StagedLexicalIndex, lexical_index_path, load_lexical_index, save_lexical_index, stage_lexical_index,
};

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// BM25 scoring parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bm25Params {
    /// Term frequency saturation. Default: 1.5
    pub k1: f32,
    /// Document length normalization, 0 = none, 1 = full. Default: 0.75
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Smoothed inverse document frequency; always positive.
#[inline]
pub fn idf(num_docs: usize, doc_freq: usize) -> f32 {
    let n = num_docs as f32;
    let df = doc_freq as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Score contribution of one query term to one chunk.
#[inline]
pub fn term_score(
    term_freq: usize,
    doc_len: usize,
    avg_doc_len: f32,
    idf_value: f32,
    params: &Bm25Params,
) -> f32 {
    let tf = term_freq as f32;
    let dl = doc_len as f32;
    let norm = if avg_doc_len > 0.0 { dl / avg_doc_len } else { 1.0 };
    idf_value * tf * (params.k1 + 1.0) / (tf + params.k1 * (1.0 - params.b + params.b * norm))
}

/// Lowercased Unicode words. Accents are kept, so `qué` and `que` differ.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}
