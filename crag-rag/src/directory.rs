//! Directory-backed vector store.
//!
//! Storage layout:
//!
//! ```text
//! <root>/                          # e.g. data/chroma_db
//! └── <collection>/
//!     └── collection.json          # StoredCollection: name, dimensions, chunks + embeddings
//! ```
//!
//! A rebuild writes a complete staging directory next to the live one and
//! renames it into place. Collections are loaded lazily into an
//! [`InMemoryVectorStore`] the first time they are queried.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorStore;
use crate::vectorstore::{StoredCollection, VectorStore};

const COLLECTION_FILE: &str = "collection.json";

/// A persistent [`VectorStore`] with one directory per collection.
#[derive(Debug)]
pub struct DirectoryVectorStore {
    root: PathBuf,
    cache: InMemoryVectorStore,
}

impl DirectoryVectorStore {
    /// Open a store rooted at `root`. Nothing is read until a collection is used.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), cache: InMemoryVectorStore::new() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the named collection.
    pub fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn ensure_loaded(&self, name: &str) -> Result<()> {
        if self.cache.contains(name).await {
            return Ok(());
        }

        let dir = self.collection_dir(name);
        let bytes = match tokio::fs::read(dir.join(COLLECTION_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RagError::MissingIndex { collection: name.to_string(), path: dir });
            }
            Err(e) => return Err(e.into()),
        };

        let stored: StoredCollection = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::IndexFormat(format!("{}: {e}", dir.display())))?;
        let stored = StoredCollection::new(name, stored.dimensions, stored.chunks)?;

        debug!(collection = name, chunk_count = stored.chunks.len(), "loaded semantic index");
        self.cache.insert(stored).await;
        Ok(())
    }

    async fn write_collection(&self, collection: &StoredCollection) -> Result<()> {
        let live = self.collection_dir(&collection.name);
        let staging = self.root.join(format!(".{}.staging", collection.name));
        let retired = self.root.join(format!(".{}.old", collection.name));

        remove_dir_if_exists(&staging).await?;
        tokio::fs::create_dir_all(&staging).await?;
        tokio::fs::write(staging.join(COLLECTION_FILE), serde_json::to_vec(collection)?).await?;

        remove_dir_if_exists(&retired).await?;
        if tokio::fs::try_exists(&live).await? {
            tokio::fs::rename(&live, &retired).await?;
        }
        tokio::fs::rename(&staging, &live).await?;
        remove_dir_if_exists(&retired).await?;
        Ok(())
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl VectorStore for DirectoryVectorStore {
    async fn replace_collection(&self, name: &str, dimensions: usize, chunks: Vec<Chunk>) -> Result<()> {
        let collection = StoredCollection::new(name, dimensions, chunks)?;
        self.write_collection(&collection).await.map_err(|e| RagError::VectorStoreError {
            backend: "Directory".to_string(),
            message: format!("failed to persist collection '{name}': {e}"),
        })?;
        info!(collection = name, chunk_count = collection.chunks.len(), dimensions, "persisted semantic index");
        self.cache.insert(collection).await;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.cache.delete_collection(name).await?;
        remove_dir_if_exists(&self.collection_dir(name)).await
    }

    async fn dimensions(&self, collection: &str) -> Result<usize> {
        self.ensure_loaded(collection).await?;
        self.cache.dimensions(collection).await
    }

    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        self.ensure_loaded(collection).await?;
        self.cache.search(collection, embedding, top_k).await
    }
}
