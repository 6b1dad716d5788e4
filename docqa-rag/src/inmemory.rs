//! In-memory vector store using cosine distance.
//!
//! [`InMemoryVectorStore`] keeps every collection in a `HashMap` behind a
//! `tokio::sync::RwLock`. It is suitable for development, tests and small
//! single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, Neighbor};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

/// An in-memory vector store using cosine distance for search.
///
/// Chunks are kept in insertion order per collection, so equal distances
/// come back in a stable order. Adding a chunk whose id already exists
/// replaces it in place.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks stored in `collection`, if it exists.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(Vec::len)
    }
}

/// Cosine distance (`1 - cosine similarity`) between two vectors.
///
/// Falls in `[0, 2]`. A zero-magnitude vector is treated as orthogonal to
/// everything, giving a distance of `1.0`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, _dimensions: usize) -> Result<()> {
        if name.is_empty() {
            return Err(RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: "collection name must not be empty".to_string(),
            });
        }
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn add(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        for chunk in chunks {
            match store.iter_mut().find(|existing| existing.id == chunk.id) {
                Some(existing) => *existing = chunk.clone(),
                None => store.push(chunk.clone()),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        let collections = self.collections.read().await;
        let store = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        let mut hits: Vec<Neighbor> = store
            .iter()
            .map(|chunk| Neighbor::new(cosine_distance(&chunk.embedding, embedding), &chunk.text))
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc: &str, idx: usize, text: &str, embedding: Vec<f32>) -> Chunk {
        let mut chunk = Chunk::new(doc, idx, text);
        chunk.embedding = embedding;
        chunk
    }

    #[test]
    fn cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[tokio::test]
    async fn query_missing_collection_is_distinguishable() {
        let store = InMemoryVectorStore::new();
        let err = store.query("nope", &[1.0], 5).await.unwrap_err();
        assert!(matches!(err, RagError::CollectionNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn empty_collection_yields_no_hits() {
        let store = InMemoryVectorStore::new();
        store.create_collection("empty.txt", 2).await.unwrap();
        assert!(store.collection_exists("empty.txt").await.unwrap());
        assert!(store.query("empty.txt", &[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_returns_nearest_first_bounded_by_limit() {
        let store = InMemoryVectorStore::new();
        store.create_collection("doc", 2).await.unwrap();
        store
            .add(
                "doc",
                &[
                    chunk("doc", 0, "far", vec![-1.0, 0.0]),
                    chunk("doc", 1, "near", vec![1.0, 0.1]),
                    chunk("doc", 2, "middle", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("doc", &[1.0, 0.0], 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, ["near", "middle"]);
    }

    #[tokio::test]
    async fn re_adding_same_id_replaces_chunk() {
        let store = InMemoryVectorStore::new();
        store.create_collection("doc", 2).await.unwrap();
        store.add("doc", &[chunk("doc", 0, "old", vec![1.0, 0.0])]).await.unwrap();
        store.add("doc", &[chunk("doc", 0, "new", vec![1.0, 0.0])]).await.unwrap();

        assert_eq!(store.len("doc").await, Some(1));
        let hits = store.query("doc", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].text, "new");
    }

    #[tokio::test]
    async fn delete_collection_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store.create_collection("doc", 2).await.unwrap();
        store.delete_collection("doc").await.unwrap();
        store.delete_collection("doc").await.unwrap();
        assert!(!store.collection_exists("doc").await.unwrap());
    }
}
