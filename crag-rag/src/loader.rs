//! Source file loading.
//!
//! `.pdf` files are loaded page by page (one [`Document`] per page, pages
//! numbered from 1); `.txt` files are loaded whole as a single document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::chunking::Chunker;
use crate::contextualizer::{ContextRequest, page_window};
use crate::document::{Document, Metadata, PAGE_KEY, SOURCE_KEY};
use crate::error::{RagError, Result};

/// How a source file is split into documents and windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// One document per page; chunks are situated in a three-page window.
    Pdf,
    /// A single document that is its own window.
    Text,
}

impl SourceKind {
    /// Classify a path by extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("pdf") => Ok(SourceKind::Pdf),
            Some("txt") => Ok(SourceKind::Text),
            _ => Err(RagError::UnsupportedSource(path.to_path_buf())),
        }
    }
}

/// A loaded source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
    /// Pages in order; a text file has exactly one.
    pub pages: Vec<Document>,
}

impl SourceFile {
    /// Build a paged source from already-extracted page texts.
    pub fn from_pages(path: impl Into<PathBuf>, pages: Vec<String>) -> Self {
        let path = path.into();
        let source = path.to_string_lossy().into_owned();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(idx, text)| {
                let page = idx + 1;
                let mut metadata = Metadata::new();
                metadata.insert(SOURCE_KEY.to_string(), source.clone());
                metadata.insert(PAGE_KEY.to_string(), page.to_string());
                Document {
                    id: format!("{source}#page={page}"),
                    text,
                    metadata,
                    source_uri: Some(source.clone()),
                }
            })
            .collect();
        Self { path, kind: SourceKind::Pdf, pages }
    }

    /// Build an unpaged source from its full text.
    pub fn from_text(path: impl Into<PathBuf>, text: String) -> Self {
        let path = path.into();
        let source = path.to_string_lossy().into_owned();
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.clone());
        let document = Document { id: source.clone(), text, metadata, source_uri: Some(source) };
        Self { path, kind: SourceKind::Text, pages: vec![document] }
    }

    /// Text the chunks of page `page_idx` (0-based) are situated in.
    pub fn window(&self, page_idx: usize) -> String {
        match self.kind {
            SourceKind::Text => self.pages.iter().map(|d| d.text.as_str()).collect::<Vec<_>>().join("\n"),
            SourceKind::Pdf => page_window(self.pages.len(), page_idx + 1)
                .map(|page| self.pages[page - 1].text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Chunk every page and pair each chunk with its window.
    pub fn context_requests(&self, chunker: &dyn Chunker) -> Vec<ContextRequest> {
        let mut requests = Vec::new();
        for (page_idx, page) in self.pages.iter().enumerate() {
            let chunks = chunker.chunk(page);
            if chunks.is_empty() {
                continue;
            }
            let window: Arc<str> = Arc::from(self.window(page_idx));
            requests.extend(chunks.into_iter().map(|chunk| ContextRequest { window: window.clone(), chunk }));
        }
        debug!(path = %self.path.display(), chunk_count = requests.len(), "chunked source file");
        requests
    }
}

/// Load a `.pdf` or `.txt` file.
///
/// # Errors
///
/// Returns [`RagError::UnsupportedSource`] for other extensions and
/// [`RagError::DocumentLoad`] if the file cannot be read or parsed.
pub async fn load_source(path: impl AsRef<Path>) -> Result<SourceFile> {
    let path = path.as_ref().to_path_buf();
    let source = match SourceKind::from_path(&path)? {
        SourceKind::Text => {
            let text = tokio::fs::read_to_string(&path).await.map_err(|e| RagError::DocumentLoad {
                path: path.clone(),
                message: e.to_string(),
            })?;
            SourceFile::from_text(path, text)
        }
        SourceKind::Pdf => {
            let extract_path = path.clone();
            let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&extract_path))
                .await
                .map_err(|e| RagError::DocumentLoad { path: path.clone(), message: e.to_string() })?
                .map_err(|e| RagError::DocumentLoad {
                    path: path.clone(),
                    message: format!("pdf extract failed: {e}"),
                })?;
            SourceFile::from_pages(path, pages)
        }
    };
    info!(path = %source.path.display(), page_count = source.pages.len(), "loaded source file");
    Ok(source)
}
