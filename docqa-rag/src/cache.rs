//! On-disk cache of chunk embeddings, one JSON file per document.
//!
//! Each entry records a SHA-256 digest of the chunk texts it was computed
//! from, so a document re-uploaded under the same name with new content is
//! re-embedded instead of paired with stale vectors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;

/// Hex SHA-256 over the chunk texts, each prefixed with its byte length.
pub fn content_digest<S: AsRef<str>>(texts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for text in texts {
        let text = text.as_ref();
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// A cached set of embeddings and the digest of the texts they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// [`content_digest`] of the embedded chunk texts.
    pub digest: String,
    /// One vector per chunk, in chunk order.
    pub embeddings: Vec<Vec<f32>>,
}

impl CacheEntry {
    /// Whether this entry was computed from exactly `texts`.
    pub fn matches<S: AsRef<str>>(&self, texts: &[S]) -> bool {
        self.embeddings.len() == texts.len() && self.digest == content_digest(texts)
    }
}

#[derive(Serialize)]
struct CacheEntryRef<'a> {
    digest: &'a str,
    embeddings: &'a [Vec<f32>],
}

/// Stores the embeddings computed for a document as `<dir>/<name>.json`.
///
/// Cache problems never fail ingestion: unreadable entries are treated as
/// misses and write failures are only logged.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    dir: PathBuf,
}

impl EmbeddingCache {
    /// Use `dir` as the cache directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Load the cache entry for `name`, if present and readable.
    ///
    /// Callers check [`CacheEntry::matches`] before using the vectors.
    pub async fn load(&self, name: &str) -> Option<CacheEntry> {
        let path = self.entry_path(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(document = name, error = %e, "failed to read cached embeddings");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => {
                debug!(document = name, "loaded cached embeddings");
                Some(entry)
            }
            Err(e) => {
                warn!(document = name, error = %e, "ignoring corrupt embedding cache entry");
                None
            }
        }
    }

    /// Write embeddings for `name` under `digest`, replacing any earlier entry.
    pub async fn save(&self, name: &str, digest: &str, embeddings: &[Vec<f32>]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec(&CacheEntryRef { digest, embeddings })?;
        tokio::fs::write(self.entry_path(name), json).await?;
        debug!(document = name, count = embeddings.len(), "saved embeddings to cache");
        Ok(())
    }

    /// Remove the entry for `name`. Missing entries are not an error.
    pub async fn remove(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
