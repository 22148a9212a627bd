//! Lexical index persistence.
//!
//! Storage layout:
//!
//! ```text
//! <data_dir>/<collection>_bm25        # JSON-serialized Bm25Index
//! ```
//!
//! Writes go to a sibling `.tmp` file that is renamed over the target, so a
//! reader never sees a half-written index.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::Bm25Index;
use crate::error::{RagError, Result};

/// Location of a collection's lexical index.
pub fn lexical_index_path(data_dir: &Path, collection: &str) -> PathBuf {
    data_dir.join(format!("{collection}_bm25"))
}

/// A serialized index written next to its target but not yet visible to
/// readers of the target path.
#[derive(Debug)]
#[must_use = "a staged index is only published by `commit`"]
pub struct StagedLexicalIndex {
    staging: PathBuf,
    target: PathBuf,
}

impl StagedLexicalIndex {
    /// The `.tmp` file holding the staged bytes.
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Publish the staged index by renaming it over the target.
    ///
    /// The staging file is removed if the rename fails.
    pub async fn commit(self) -> Result<PathBuf> {
        if let Err(e) = tokio::fs::rename(&self.staging, &self.target).await {
            remove_staging(&self.staging).await;
            return Err(e.into());
        }
        debug!(path = %self.target.display(), "published lexical index");
        Ok(self.target)
    }

    /// Drop the staged index, leaving the target untouched.
    pub async fn discard(self) {
        remove_staging(&self.staging).await;
    }
}

async fn remove_staging(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged lexical index"),
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Serialize `index` to the staging file of `path` without touching `path`.
pub async fn stage_lexical_index(index: &Bm25Index, path: &Path) -> Result<StagedLexicalIndex> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let bytes = serde_json::to_vec(index)?;
    let staging = staging_path(path);
    if let Err(e) = tokio::fs::write(&staging, &bytes).await {
        remove_staging(&staging).await;
        return Err(e.into());
    }

    debug!(
        path = %staging.display(),
        chunk_count = index.len(),
        vocabulary = index.vocabulary_size(),
        "staged lexical index"
    );
    Ok(StagedLexicalIndex { staging, target: path.to_path_buf() })
}

/// Atomically replace the lexical index at `path`.
pub async fn save_lexical_index(index: &Bm25Index, path: &Path) -> Result<()> {
    stage_lexical_index(index, path).await?.commit().await?;
    Ok(())
}

/// Load the lexical index of `collection` from `path`.
///
/// # Errors
///
/// Returns [`RagError::MissingIndex`] naming `path` if the file does not
/// exist, and [`RagError::IndexFormat`] if it cannot be interpreted.
pub async fn load_lexical_index(path: &Path, collection: &str) -> Result<Bm25Index> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RagError::MissingIndex {
                collection: collection.to_string(),
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let index: Bm25Index = serde_json::from_slice(&bytes)
        .map_err(|e| RagError::IndexFormat(format!("{}: {e}", path.display())))?;
    index.validate()?;

    debug!(path = %path.display(), chunk_count = index.len(), "loaded lexical index");
    Ok(index)
}
