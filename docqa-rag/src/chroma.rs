//! Chroma vector store backend.
//!
//! Provides [`ChromaVectorStore`], which implements [`VectorStore`] against a
//! Chroma server's REST API (`/api/v1`). Collections are created with cosine
//! distance, so query distances fall in `[0, 2]`.
//!
//! This module is only available when the `chroma` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::chroma::ChromaVectorStore;
//!
//! let store = ChromaVectorStore::new("http://localhost:8001");
//! store.create_collection("report.pdf", 768).await?;
//! store.add("report.pdf", &chunks).await?;
//! let hits = store.query("report.pdf", &query_embedding, 5).await?;
//! ```

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::document::{Chunk, Neighbor};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// The default Chroma server address.
pub const DEFAULT_CHROMA_URL: &str = "http://localhost:8001";

const BACKEND: &str = "chroma";

/// A [`VectorStore`] backed by a [Chroma](https://www.trychroma.com/) server.
pub struct ChromaVectorStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<Value>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 2],
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
}

/// Pair the distances and documents of the first (only) query embedding.
fn neighbors_from_response(response: QueryResponse) -> Vec<Neighbor> {
    let distances = response.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();
    let documents = response.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
    distances
        .into_iter()
        .zip(documents)
        .filter_map(|(distance, text)| text.map(|text| Neighbor { distance, text }))
        .collect()
}

impl ChromaVectorStore {
    /// Create a store talking to the Chroma server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// Create a store for the default address (`http://localhost:8001`).
    pub fn default_url() -> Self {
        Self::new(DEFAULT_CHROMA_URL)
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Build `<base>/api/v1/<segments...>`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Self::map_err(format!("invalid base URL '{}': {e}", self.base_url)))?;
        let cannot_be_base = |()| Self::map_err(format!("base URL '{}' has no path", self.base_url));
        url.path_segments_mut()
            .map_err(cannot_be_base)?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    fn map_err(message: impl Into<String>) -> RagError {
        RagError::VectorStoreError { backend: BACKEND.to_string(), message: message.into() }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| Self::map_err(format!("request failed: {e}")))
    }

    /// Resolve a collection name to Chroma's internal id.
    async fn collection_id(&self, name: &str) -> Result<String> {
        let response = self.send(self.client.get(self.url(&["collections", name])?)).await?;
        let status = response.status();
        if status.is_success() {
            let info: CollectionInfo = response
                .json()
                .await
                .map_err(|e| Self::map_err(format!("failed to parse collection: {e}")))?;
            return Ok(info.id);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND || body.contains("does not exist") {
            return Err(RagError::CollectionNotFound(name.to_string()));
        }
        Err(Self::map_err(format!("API returned {status}: {body}")))
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::map_err(format!("API returned {status}: {body}")))
    }
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let body = json!({
            "name": name,
            "metadata": { "hnsw:space": "cosine" },
            "get_or_create": true,
        });
        let request = self.client.post(self.url(&["collections"])?).json(&body);
        let response = self.send(request).await?;
        Self::expect_success(response).await?;
        debug!(collection = name, dimensions, "ensured chroma collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let response = self.send(self.client.delete(self.url(&["collections", name])?)).await?;
        let status = response.status();
        if status.is_success() {
            debug!(collection = name, "deleted chroma collection");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND || body.contains("does not exist") {
            return Ok(());
        }
        Err(Self::map_err(format!("API returned {status}: {body}")))
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        match self.collection_id(name).await {
            Ok(_) => Ok(true),
            Err(RagError::CollectionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn add(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection).await?;
        let request = UpsertRequest {
            ids: chunks.iter().map(|c| c.id.as_str()).collect(),
            embeddings: chunks.iter().map(|c| c.embedding.as_slice()).collect(),
            documents: chunks.iter().map(|c| c.text.as_str()).collect(),
            metadatas: chunks.iter().map(|c| json!({ "doc_id": c.doc_id })).collect(),
        };
        let response = self
            .send(self.client.post(self.url(&["collections", &id, "upsert"])?).json(&request))
            .await?;
        Self::expect_success(response).await?;
        debug!(collection, count = chunks.len(), "upserted chunks to chroma");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        let id = self.collection_id(collection).await?;
        let request = QueryRequest {
            query_embeddings: [embedding],
            n_results: limit,
            include: ["documents", "distances"],
        };
        let response = self
            .send(self.client.post(self.url(&["collections", &id, "query"])?).json(&request))
            .await?;
        let body: QueryResponse = Self::expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| Self::map_err(format!("failed to parse query response: {e}")))?;
        Ok(neighbors_from_response(body))
    }
}
