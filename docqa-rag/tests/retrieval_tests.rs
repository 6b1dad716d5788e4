//! Multi-collection retrieval: ranking properties and partial-failure behaviour.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::document::{Chunk, Neighbor};
use docqa_rag::error::{RagError, Result};
use docqa_rag::mock::MockEmbeddingProvider;
use docqa_rag::registry::DocumentRegistry;
use docqa_rag::retrieval::{RetrievalMerger, merge_ranked};
use docqa_rag::vectorstore::VectorStore;
use proptest::prelude::*;
use tokio::sync::Mutex;

enum Script {
    Hits(Vec<Neighbor>),
    Fail,
    Hang,
}

/// A vector store that answers each collection from a fixed script and
/// records every query it receives.
#[derive(Default)]
struct ScriptedStore {
    scripts: HashMap<String, Script>,
    queries: Mutex<Vec<(String, Vec<f32>, usize)>>,
}

impl ScriptedStore {
    fn with(mut self, collection: &str, script: Script) -> Self {
        self.scripts.insert(collection.to_string(), script);
        self
    }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn create_collection(&self, _name: &str, _dimensions: usize) -> Result<()> {
        Ok(())
    }

    async fn delete_collection(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.scripts.contains_key(name))
    }

    async fn add(&self, _collection: &str, _chunks: &[Chunk]) -> Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        self.queries.lock().await.push((collection.to_string(), embedding.to_vec(), limit));
        match self.scripts.get(collection) {
            None => Err(RagError::CollectionNotFound(collection.to_string())),
            Some(Script::Fail) => Err(RagError::VectorStoreError {
                backend: "scripted".into(),
                message: "connection refused".into(),
            }),
            Some(Script::Hang) => futures::future::pending().await,
            Some(Script::Hits(hits)) => Ok(hits.iter().take(limit).cloned().collect()),
        }
    }
}

fn hits(pairs: &[(f32, &str)]) -> Script {
    Script::Hits(pairs.iter().map(|&pair| Neighbor::from(pair)).collect())
}

type Harness = (RetrievalMerger, Arc<MockEmbeddingProvider>, Arc<ScriptedStore>);

fn merger(store: ScriptedStore) -> Harness {
    let embedder = Arc::new(MockEmbeddingProvider::new(8));
    let store = Arc::new(store);
    let merger = RetrievalMerger::new(embedder.clone(), store.clone());
    (merger, embedder, store)
}

#[tokio::test]
async fn two_documents_are_interleaved_by_distance() {
    let store = ScriptedStore::default()
        .with("docA", hits(&[(0.05, "A1"), (0.3, "A2")]))
        .with("docB", hits(&[(0.1, "B1"), (0.9, "B2")]));
    let (merger, _, _) = merger(store);

    let context = merger.with_top_n(3).retrieve("question", &["docA", "docB"]).await.unwrap();

    assert_eq!(context.passages(), ["A1", "B1", "A2"]);
    assert!(context.failures().is_empty());
}

#[tokio::test]
async fn question_is_embedded_once_and_shared() {
    let store = ScriptedStore::default()
        .with("a", hits(&[(0.1, "a")]))
        .with("b", hits(&[(0.2, "b")]))
        .with("c", hits(&[(0.3, "c")]));
    let (merger, embedder, store) = merger(store);

    merger
        .with_neighbors_per_collection(4)
        .retrieve("what happened?", &["a", "b", "c"])
        .await
        .unwrap();

    assert_eq!(embedder.calls(), 1);
    let queries = store.queries.lock().await;
    assert_eq!(queries.len(), 3);
    assert!(queries.iter().all(|(_, vector, limit)| vector == &queries[0].1 && *limit == 4));
}

#[tokio::test]
async fn failing_collection_degrades_to_remaining_ones() {
    let a = [(0.4, "a1"), (0.1, "a2")];
    let c = [(0.2, "c1"), (0.3, "c2")];
    let store =
        ScriptedStore::default().with("a", hits(&a)).with("b", Script::Fail).with("c", hits(&c));
    let (merger, _, _) = merger(store);

    let context = merger.retrieve("q", &["a", "b", "c"]).await.unwrap();

    let expected = merge_ranked(
        [
            a.iter().map(|&p| Neighbor::from(p)).collect(),
            c.iter().map(|&p| Neighbor::from(p)).collect(),
        ],
        7,
    );
    assert_eq!(context.passages(), expected.as_slice());
    assert_eq!(context.failures().len(), 1);
    assert_eq!(context.failures()[0].collection, "b");
    assert!(context.failures()[0].reason.contains("connection refused"));
}

#[tokio::test]
async fn missing_collection_is_reported_not_fatal() {
    let store = ScriptedStore::default().with("known", hits(&[(0.1, "k")]));
    let (merger, _, _) = merger(store);

    let context = merger.retrieve("q", &["known", "ghost"]).await.unwrap();

    assert_eq!(context.passages(), ["k"]);
    assert_eq!(context.failures()[0].collection, "ghost");
}

#[tokio::test]
async fn slow_collection_times_out_and_is_skipped() {
    let store = ScriptedStore::default()
        .with("fast", hits(&[(0.5, "fast")]))
        .with("slow", Script::Hang);
    let (merger, _, _) = merger(store);

    let context = merger
        .with_query_timeout(Duration::from_millis(50))
        .retrieve("q", &["slow", "fast"])
        .await
        .unwrap();

    assert_eq!(context.passages(), ["fast"]);
    assert_eq!(context.failures()[0].collection, "slow");
    assert!(context.failures()[0].reason.contains("timed out"));
}

#[tokio::test]
async fn every_collection_failing_yields_empty_context() {
    let store = ScriptedStore::default().with("x", Script::Fail).with("y", Script::Fail);
    let (merger, _, _) = merger(store);

    let context = merger.retrieve("q", &["x", "y"]).await.unwrap();

    assert!(context.is_empty());
    assert_eq!(context.failures().len(), 2);
}

#[tokio::test]
async fn empty_collections_yield_empty_context() {
    let store = ScriptedStore::default().with("x", hits(&[])).with("y", hits(&[]));
    let (merger, _, _) = merger(store);

    let context = merger.retrieve("q", &["x", "y"]).await.unwrap();

    assert!(context.is_empty());
    assert!(context.failures().is_empty());
}

#[tokio::test]
async fn embedding_failure_aborts_before_any_query() {
    let store = Arc::new(ScriptedStore::default().with("a", hits(&[(0.1, "a")])));
    let merger = RetrievalMerger::new(Arc::new(MockEmbeddingProvider::failing(8)), store.clone());

    let err = merger.retrieve("q", &["a"]).await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingError { .. }));
    assert!(store.queries.lock().await.is_empty());
}

#[tokio::test]
async fn unregistered_collections_are_not_queried() {
    let registry = Arc::new(DocumentRegistry::new());
    registry.register("listed").await;
    let store = ScriptedStore::default()
        .with("listed", hits(&[(0.2, "listed")]))
        .with("unlisted", hits(&[(0.1, "unlisted")]));
    let (merger, _, store) = merger(store);

    let context =
        merger.with_registry(registry).retrieve("q", &["listed", "unlisted"]).await.unwrap();

    assert_eq!(context.passages(), ["listed"]);
    assert_eq!(context.failures()[0].collection, "unlisted");
    let queried: Vec<String> = store.queries.lock().await.iter().map(|q| q.0.clone()).collect();
    assert_eq!(queried, ["listed"]);
}

#[tokio::test]
async fn blank_question_and_no_collections_are_rejected() {
    let (merger, embedder, _) = merger(ScriptedStore::default());

    assert!(matches!(merger.retrieve("  ", &["a"]).await, Err(RagError::InvalidRequest(_))));
    let none: [&str; 0] = [];
    assert!(matches!(merger.retrieve("q", &none).await, Err(RagError::InvalidRequest(_))));
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn raising_k_widens_pool_but_not_output() {
    let store = Arc::new(
        ScriptedStore::default()
            .with("a", hits(&[(0.5, "a1"), (0.6, "a2"), (0.05, "a3")]))
            .with("b", hits(&[(0.4, "b1")])),
    );
    let embedder = Arc::new(MockEmbeddingProvider::new(8));
    let build = |k| {
        RetrievalMerger::new(embedder.clone(), store.clone())
            .with_neighbors_per_collection(k)
            .with_top_n(2)
    };

    let narrow = build(2).retrieve("q", &["a", "b"]).await.unwrap();
    let wide = build(3).retrieve("q", &["a", "b"]).await.unwrap();

    assert_eq!(narrow.passages(), ["b1", "a1"]);
    assert_eq!(wide.passages(), ["a3", "b1"]);
}

// ── Properties of the merge step ──────────────────────────────────

/// Per-collection hit lists with distances from a small grid, so ties are common.
fn arb_collections() -> impl Strategy<Value = Vec<Vec<Neighbor>>> {
    proptest::collection::vec(proptest::collection::vec(0u8..8, 0..6), 0..5).prop_map(|lists| {
        lists
            .into_iter()
            .enumerate()
            .map(|(c, steps)| {
                steps
                    .into_iter()
                    .enumerate()
                    .map(|(i, step)| Neighbor::new(f32::from(step) * 0.25, format!("c{c}-{i}")))
                    .collect()
            })
            .collect()
    })
}

mod prop_merge_ranked {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn sorted_bounded_and_stable(collections in arb_collections(), top_n in 1usize..12) {
            let distance_of: HashMap<String, f32> = collections
                .iter()
                .flatten()
                .map(|hit| (hit.text.clone(), hit.distance))
                .collect();
            let total: usize = collections.iter().map(Vec::len).sum();

            let merged = merge_ranked(collections.clone(), top_n);

            prop_assert_eq!(merged.len(), top_n.min(total));
            for window in merged.windows(2) {
                prop_assert!(distance_of[&window[0]] <= distance_of[&window[1]]);
            }

            // Reference: order by (distance, position in concatenated input).
            let mut reference: Vec<(f32, usize, String)> = collections
                .into_iter()
                .flatten()
                .enumerate()
                .map(|(pos, hit)| (hit.distance, pos, hit.text))
                .collect();
            reference.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let expected: Vec<String> =
                reference.into_iter().take(top_n).map(|(_, _, text)| text).collect();
            prop_assert_eq!(merged, expected);
        }

        #[test]
        fn single_collection_matches_sort_and_truncate(
            collections in arb_collections(),
            top_n in 1usize..8,
        ) {
            let Some(only) = collections.into_iter().next() else { return Ok(()); };
            let mut sorted = only.clone();
            sorted.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            let expected: Vec<String> = sorted.into_iter().take(top_n).map(|h| h.text).collect();

            prop_assert_eq!(merge_ranked([only], top_n), expected);
        }
    }
}
