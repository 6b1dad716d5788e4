//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! Collections use cosine similarity; scores are reported back as cosine
//! distance (`1 - score`) so they rank the same way as every other backend.
//!
//! This module is only available when the `qdrant` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.create_collection("report.pdf", 768).await?;
//! let hits = store.query("report.pdf", &query_embedding, 5).await?;
//! ```

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::json;
use tracing::debug;

use crate::document::{Chunk, Neighbor};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: QdrantError) -> RagError {
        RagError::VectorStoreError { backend: "qdrant".to_string(), message: e.to_string() }
    }

    /// Like [`Self::map_err`], but recognises Qdrant's missing-collection error.
    fn map_collection_err(collection: &str, e: QdrantError) -> RagError {
        let message = e.to_string();
        if message.contains("doesn't exist") || message.contains("Not found") {
            RagError::CollectionNotFound(collection.to_string())
        } else {
            Self::map_err(e)
        }
    }

    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Convert a cosine similarity score to a cosine distance in `[0, 2]`.
fn score_to_distance(score: f32) -> f32 {
    (1.0 - score).clamp(0.0, 2.0)
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.client.collection_exists(name).await.map_err(Self::map_err)? {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.client.collection_exists(name).await.map_err(Self::map_err)? {
            return Ok(());
        }
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client.collection_exists(name).await.map_err(Self::map_err)
    }

    async fn add(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .map(|chunk| {
                let payload = Payload::try_from(json!({
                    "text": chunk.text,
                    "document_id": chunk.document_id,
                    "doc_id": chunk.doc_id,
                }))
                .map_err(Self::map_err)?;
                Ok(PointStruct::new(chunk.doc_id as u64, chunk.embedding.clone(), payload))
            })
            .collect::<Result<Vec<PointStruct>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| Self::map_collection_err(collection, e))?;

        debug!(collection, count = chunks.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, embedding.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| Self::map_collection_err(collection, e))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|scored| {
                let text = scored.payload.get("text").and_then(Self::extract_string)?;
                Some(Neighbor { distance: score_to_distance(scored.score), text })
            })
            .collect();

        Ok(hits)
    }
}
