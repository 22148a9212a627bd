//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: splits at paragraph, line, sentence and word
//!   boundaries before falling back to raw characters
//! - [`FixedSizeChunker`]: splits by character count with configurable overlap
//!
//! Sizes are counted in characters, never bytes, and every chunk is an exact
//! contiguous span of its document: concatenating the spans while skipping
//! the overlapped prefix of each one rebuilds the document text.

use std::collections::VecDeque;

use crate::document::{CHUNK_INDEX_KEY, Chunk, Document, START_INDEX_KEY};

/// Separators tried in order, coarsest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the semantic index.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// A half-open byte range `[start, end)` into the split text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    /// Borrow the spanned text.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Splits text hierarchically: paragraphs → lines → sentences → words → characters.
///
/// Pieces small enough to fit are merged greedily into chunks of at most
/// `chunk_size` characters. Each new chunk re-includes trailing pieces of the
/// previous one, up to `chunk_overlap` characters.
///
/// # Example
///
/// ```rust,ignore
/// use crag_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(800, 100);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: maximum number of characters shared by consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let spans = split_text(&document.text, self.chunk_size, self.chunk_overlap);
        build_chunks(document, &spans)
    }
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus `chunk_index` and `start_index` fields.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let spans = split_fixed(&document.text, self.chunk_size, self.chunk_overlap);
        build_chunks(document, &spans)
    }
}

/// Split `text` into boundary-aware spans of at most `chunk_size` characters.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextSpan> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    partition(text, 0, chunk_size, &SEPARATORS, &mut pieces);
    merge_pieces(&pieces, chunk_size, chunk_overlap)
}

/// Split `text` into windows of `chunk_size` characters advancing by
/// `chunk_size - chunk_overlap`.
pub fn split_fixed(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextSpan> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let bounds: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let char_count = bounds.len() - 1;
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(char_count);
        spans.push(TextSpan { start: bounds[start], end: bounds[end] });
        if end == char_count {
            break;
        }
        start += step;
    }
    spans
}

/// An indivisible run of text no longer than the chunk size.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Partition `text` (located at byte `offset` of the original) into pieces that
/// each fit in `chunk_size` characters, splitting at the first separator that
/// occurs and recursing with the finer ones.
fn partition(
    text: &str,
    offset: usize,
    chunk_size: usize,
    separators: &[&str],
    out: &mut Vec<Piece>,
) {
    let chars = text.chars().count();
    if chars <= chunk_size {
        if chars > 0 {
            out.push(Piece { start: offset, end: offset + text.len(), chars });
        }
        return;
    }

    let Some((separator, finer)) = separators.split_first() else {
        let mut piece_start = 0;
        let mut count = 0;
        for (idx, _) in text.char_indices() {
            if count == chunk_size {
                out.push(Piece { start: offset + piece_start, end: offset + idx, chars: count });
                piece_start = idx;
                count = 0;
            }
            count += 1;
        }
        out.push(Piece { start: offset + piece_start, end: offset + text.len(), chars: count });
        return;
    };

    for (start, end) in split_keeping_separator(text, separator) {
        partition(&text[start..end], offset + start, chunk_size, finer, out);
    }
}

/// Byte ranges of `text` split at `separator`, each separator kept on the preceding range.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<(usize, usize)> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push((start, end));
        start = end;
    }

    if start < text.len() {
        result.push((start, text.len()));
    }

    result
}

fn merge_pieces(pieces: &[Piece], chunk_size: usize, chunk_overlap: usize) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut window: VecDeque<Piece> = VecDeque::new();
    let mut window_chars = 0;

    for piece in pieces {
        if !window.is_empty() && window_chars + piece.chars > chunk_size {
            spans.push(window_span(&window));
            // Keep a trailing overlap that still leaves room for the next piece.
            while let Some(front) = window.front() {
                if window_chars > chunk_overlap || window_chars + piece.chars > chunk_size {
                    window_chars -= front.chars;
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
        window_chars += piece.chars;
        window.push_back(*piece);
    }

    if !window.is_empty() {
        spans.push(window_span(&window));
    }
    spans
}

fn window_span(window: &VecDeque<Piece>) -> TextSpan {
    let start = window.front().map_or(0, |p| p.start);
    let end = window.back().map_or(start, |p| p.end);
    TextSpan { start, end }
}

/// Turn spans of `document.text` into chunks with positional metadata.
fn build_chunks(document: &Document, spans: &[TextSpan]) -> Vec<Chunk> {
    let text = &document.text;
    let mut chunks = Vec::with_capacity(spans.len());
    let mut last_byte = 0;
    let mut last_char = 0;

    for (chunk_index, span) in spans.iter().enumerate() {
        last_char += text[last_byte..span.start].chars().count();
        last_byte = span.start;

        let mut metadata = document.metadata.clone();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), chunk_index.to_string());
        metadata.insert(START_INDEX_KEY.to_string(), last_char.to_string());

        chunks.push(Chunk {
            id: format!("{}_{chunk_index}", document.id),
            text: span.slice(text).to_string(),
            embedding: Vec::new(),
            metadata,
            document_id: document.id.clone(),
        });
    }

    chunks
}
