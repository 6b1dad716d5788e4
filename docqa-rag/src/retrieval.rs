//! Multi-collection retrieval and ranking.
//!
//! [`RetrievalMerger`] embeds a question once, queries every requested
//! collection concurrently with that single vector, and merges the hits into
//! one globally ranked list:
//!
//! 1. embed the question (failure aborts the whole retrieval)
//! 2. query each collection for up to `k` neighbours (failure or timeout
//!    drops that collection only)
//! 3. concatenate the hits in request order and stable-sort by ascending
//!    distance
//! 4. keep the first `top_n` texts
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::RetrievalMerger;
//!
//! let merger = RetrievalMerger::new(embedder, store).with_registry(registry);
//! let context = merger.retrieve("What is the capital of France?", &["geo.pdf"]).await?;
//! for passage in context.passages() {
//!     println!("{passage}");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::document::Neighbor;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::registry::DocumentRegistry;
use crate::vectorstore::VectorStore;

/// A collection whose query failed and was left out of the merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionFailure {
    /// Name of the collection.
    pub collection: String,
    /// Why its query failed.
    pub reason: String,
}

/// The chunks selected as generation context, most similar first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RankedContext {
    passages: Vec<String>,
    failures: Vec<CollectionFailure>,
}

impl RankedContext {
    /// Create a context from already ranked passages.
    pub fn new(passages: Vec<String>) -> Self {
        Self { passages, failures: Vec::new() }
    }

    /// The selected chunk texts in ranked order.
    pub fn passages(&self) -> &[String] {
        &self.passages
    }

    /// Consume the context, returning the ranked chunk texts.
    pub fn into_passages(self) -> Vec<String> {
        self.passages
    }

    /// Collections that could not be queried.
    pub fn failures(&self) -> &[CollectionFailure] {
        &self.failures
    }

    /// Number of selected passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Whether no passage was selected.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// The passages joined with newlines, as fed to the generation prompt.
    pub fn joined(&self) -> String {
        self.passages.join("\n")
    }
}

/// Merge per-collection hits into one list of at most `top_n` texts.
///
/// Hits are concatenated in the order given and sorted by ascending
/// distance with a stable sort, so equal distances keep their input order.
/// Duplicate texts are kept.
pub fn merge_ranked<I>(results: I, top_n: usize) -> Vec<String>
where
    I: IntoIterator<Item = Vec<Neighbor>>,
{
    let mut combined: Vec<Neighbor> = results.into_iter().flatten().collect();
    combined.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    combined.into_iter().take(top_n).map(|hit| hit.text).collect()
}

/// Queries several document collections with one question and ranks the
/// combined hits.
pub struct RetrievalMerger {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    registry: Option<Arc<DocumentRegistry>>,
    neighbors_per_collection: usize,
    top_n: usize,
    query_timeout: Duration,
}

impl RetrievalMerger {
    /// Create a merger using the default `k`, `top_n` and timeout.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        let defaults = RagConfig::default();
        Self {
            embedding_provider,
            vector_store,
            registry: None,
            neighbors_per_collection: defaults.neighbors_per_collection,
            top_n: defaults.top_n,
            query_timeout: defaults.query_timeout(),
        }
    }

    /// Skip collections that are not registered.
    pub fn with_registry(mut self, registry: Arc<DocumentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Take `k`, `top_n` and the query timeout from `config`.
    pub fn with_config(mut self, config: &RagConfig) -> Self {
        self.neighbors_per_collection = config.neighbors_per_collection;
        self.top_n = config.top_n;
        self.query_timeout = config.query_timeout();
        self
    }

    /// Override how many neighbours each collection contributes.
    pub fn with_neighbors_per_collection(mut self, k: usize) -> Self {
        self.neighbors_per_collection = k;
        self
    }

    /// Override how many passages are kept after merging.
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Override the per-collection query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Embed `question` once and retrieve the best passages across `collections`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidRequest`] for an empty question or an empty
    /// collection list, and the provider's error if the question cannot be
    /// embedded. Failures of individual collections are never returned; they
    /// are reported through [`RankedContext::failures`].
    pub async fn retrieve<S>(&self, question: &str, collections: &[S]) -> Result<RankedContext>
    where
        S: AsRef<str> + Sync,
    {
        if question.trim().is_empty() {
            return Err(RagError::InvalidRequest("question must not be empty".into()));
        }
        if collections.is_empty() {
            return Err(RagError::InvalidRequest("at least one collection is required".into()));
        }

        let query_embedding = self.embedding_provider.embed(question).await.map_err(|e| {
            error!(error = %e, "embedding failed during retrieval");
            e
        })?;

        Ok(self.retrieve_with_embedding(&query_embedding, collections).await)
    }

    /// Retrieve with an already computed query vector.
    ///
    /// Every collection is queried concurrently with the same vector. This
    /// never fails: if no collection answers, the context is empty.
    pub async fn retrieve_with_embedding<S>(
        &self,
        query_embedding: &[f32],
        collections: &[S],
    ) -> RankedContext
    where
        S: AsRef<str> + Sync,
    {
        let outcomes = join_all(
            collections.iter().map(|name| self.query_collection(name.as_ref(), query_embedding)),
        )
        .await;

        let mut hits = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (name, outcome) in collections.iter().zip(outcomes) {
            let name = name.as_ref();
            match outcome {
                Ok(neighbors) => {
                    debug!(collection = name, hit_count = neighbors.len(), "collection queried");
                    hits.push(neighbors);
                }
                Err(e) => {
                    warn!(collection = name, error = %e, "collection query failed, skipping");
                    failures.push(CollectionFailure {
                        collection: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let passages = merge_ranked(hits, self.top_n);
        info!(
            collection_count = collections.len(),
            failed_count = failures.len(),
            passage_count = passages.len(),
            "retrieval completed"
        );

        RankedContext { passages, failures }
    }

    async fn query_collection(&self, name: &str, query_embedding: &[f32]) -> Result<Vec<Neighbor>> {
        if let Some(registry) = &self.registry {
            if !registry.exists(name).await {
                return Err(RagError::CollectionNotFound(name.to_string()));
            }
        }

        let query = self.vector_store.query(name, query_embedding, self.neighbors_per_collection);
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => result,
            Err(_) => Err(RagError::QueryTimeout {
                collection: name.to_string(),
                timeout_ms: self.query_timeout.as_millis(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(pairs: &[(f32, &str)]) -> Vec<Neighbor> {
        pairs.iter().map(|&pair| Neighbor::from(pair)).collect()
    }

    #[test]
    fn merges_two_collections_by_distance() {
        let doc_a = hits(&[(0.05, "A1"), (0.3, "A2")]);
        let doc_b = hits(&[(0.1, "B1"), (0.9, "B2")]);
        assert_eq!(merge_ranked([doc_a, doc_b], 3), ["A1", "B1", "A2"]);
    }

    #[test]
    fn unsorted_collection_input_is_sorted() {
        let doc = hits(&[(0.7, "c"), (0.1, "a"), (0.4, "b")]);
        assert_eq!(merge_ranked([doc], 7), ["a", "b", "c"]);
    }

    #[test]
    fn top_n_larger_than_pool_returns_everything() {
        let doc = hits(&[(0.2, "x"), (0.1, "y")]);
        assert_eq!(merge_ranked([doc, Vec::new()], 10), ["y", "x"]);
    }

    #[test]
    fn duplicates_across_collections_are_kept() {
        let paris = "Paris is the capital of France";
        let merged = merge_ranked([hits(&[(0.1, paris)]), hits(&[(0.1, paris)])], 7);
        assert_eq!(merged, [paris, paris]);
    }

    #[test]
    fn equal_distances_keep_insertion_order() {
        let merged =
            merge_ranked([hits(&[(0.5, "first"), (0.2, "best")]), hits(&[(0.5, "second")])], 3);
        assert_eq!(merged, ["best", "first", "second"]);
    }

    #[test]
    fn empty_inputs_give_empty_output() {
        assert!(merge_ranked(Vec::<Vec<Neighbor>>::new(), 7).is_empty());
        assert!(merge_ranked([Vec::new(), Vec::new()], 7).is_empty());
    }

    #[test]
    fn joined_context_is_newline_delimited() {
        let context = RankedContext::new(vec!["one".into(), "two".into()]);
        assert_eq!(context.joined(), "one\ntwo");
        assert_eq!(context.len(), 2);
        assert!(context.failures().is_empty());
    }
}
