//! Vector store trait: one similarity-searchable namespace per document.

use async_trait::async_trait;

use crate::document::{Chunk, Neighbor};
use crate::error::Result;

/// A storage backend for chunk embeddings with nearest-neighbour search.
///
/// Every uploaded document lives in its own named collection. Backends must
/// report a query against a missing collection as
/// [`RagError::CollectionNotFound`](crate::RagError::CollectionNotFound) so
/// that "no such namespace" stays distinguishable from "no results".
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("report.pdf", 768).await?;
/// store.add("report.pdf", &chunks).await?;
/// let hits = store.query("report.pdf", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it is missing.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Whether a collection with this name exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Add chunks to a collection, replacing any chunk with the same id.
    /// Chunks must have embeddings set.
    async fn add(&self, collection: &str, chunks: &[Chunk]) -> Result<()>;

    /// Return up to `limit` nearest neighbours of `embedding` in `collection`.
    ///
    /// Results are in the backend's relevance order, which callers must not
    /// rely on being strictly sorted by distance.
    async fn query(&self, collection: &str, embedding: &[f32], limit: usize)
    -> Result<Vec<Neighbor>>;
}
