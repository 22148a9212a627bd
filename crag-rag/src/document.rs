//! Data types for documents, chunks, and search results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ordered string metadata. Ordered so persisted indexes serialize deterministically.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the source file path.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the 1-based page number of PDF chunks.
pub const PAGE_KEY: &str = "page";
/// Metadata key holding the character offset of a chunk in its document.
pub const START_INDEX_KEY: &str = "start_index";
/// Metadata key holding the position of a chunk within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
/// Metadata key set once a chunk has been contextualized.
pub const SOURCE_TAG_KEY: &str = "source_tag";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: Metadata,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

/// A segment of a [`Document`], optionally carrying its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: Metadata,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// Identity used to merge duplicates across retrievers: text plus metadata.
    pub fn identity(&self) -> ChunkIdentity {
        ChunkIdentity { text: self.text.clone(), metadata: self.metadata.clone() }
    }
}

/// Content-and-metadata identity of a [`Chunk`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkIdentity {
    text: String,
    metadata: Metadata,
}

/// A retrieved [`Chunk`] paired with a relevance score.
///
/// Scores are only comparable between results produced by the same stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The stage-specific score (higher is more relevant).
    pub score: f32,
}
