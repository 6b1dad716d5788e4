//! Registry of documents that have finished processing.
//!
//! The upload/delete workflow owns the [`DocumentRegistry`] and mutates it;
//! retrieval only ever calls [`DocumentRegistry::exists`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

/// Bookkeeping kept for each registered document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// The document (and collection) name.
    pub name: String,
    /// Lower-case hex SHA-256 of `name`.
    pub name_hash: String,
    /// When the document was last registered.
    pub registered_at: DateTime<Utc>,
}

/// Tracks which documents are available for questioning.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: RwLock<HashMap<String, DocumentRecord>>,
}

impl DocumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, replacing any earlier record under the same name.
    pub async fn register(&self, name: &str) -> DocumentRecord {
        let record = DocumentRecord {
            name: name.to_string(),
            name_hash: name_hash(name),
            registered_at: Utc::now(),
        };
        self.documents.write().await.insert(name.to_string(), record.clone());
        debug!(document = name, "registered document");
        record
    }

    /// Whether `name` is registered.
    pub async fn exists(&self, name: &str) -> bool {
        self.documents.read().await.contains_key(name)
    }

    /// Remove `name`, returning its record if it was registered.
    pub async fn unregister(&self, name: &str) -> Option<DocumentRecord> {
        let removed = self.documents.write().await.remove(name);
        if removed.is_some() {
            debug!(document = name, "unregistered document");
        }
        removed
    }

    /// Look up the record for `name`.
    pub async fn get(&self, name: &str) -> Option<DocumentRecord> {
        self.documents.read().await.get(name).cloned()
    }

    /// Whether no document is registered.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// All registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.documents.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Hex-encoded SHA-256 digest of a document name.
pub fn name_hash(name: &str) -> String {
    Sha256::digest(name.as_bytes()).iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_exists_unregister() {
        let registry = DocumentRegistry::new();
        assert!(registry.is_empty().await);
        assert!(!registry.exists("notes.txt").await);

        registry.register("notes.txt").await;
        assert!(registry.exists("notes.txt").await);
        assert!(!registry.is_empty().await);

        let removed = registry.unregister("notes.txt").await.expect("was registered");
        assert_eq!(removed.name, "notes.txt");
        assert!(!registry.exists("notes.txt").await);
        assert!(registry.unregister("notes.txt").await.is_none());
    }

    #[tokio::test]
    async fn re_registering_keeps_one_entry() {
        let registry = DocumentRegistry::new();
        registry.register("a.pdf").await;
        registry.register("b.pdf").await;
        registry.register("a.pdf").await;
        assert_eq!(registry.names().await, ["a.pdf", "b.pdf"]);
    }

    #[test]
    fn name_hash_is_sha256_hex() {
        assert_eq!(
            name_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
