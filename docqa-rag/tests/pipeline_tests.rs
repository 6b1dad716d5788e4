//! End-to-end pipeline behaviour with in-memory storage and mock providers.

use std::sync::Arc;

use docqa_rag::mock::{MockEmbeddingProvider, MockGenerationProvider};
use docqa_rag::{
    Document, EmbeddingCache, EmbeddingProvider, InMemoryVectorStore, QaPipeline, RagConfig,
    RagError, VectorStore,
};
use futures::StreamExt;

struct Harness {
    pipeline: QaPipeline,
    embedder: Arc<MockEmbeddingProvider>,
    generator: Arc<MockGenerationProvider>,
    store: Arc<InMemoryVectorStore>,
}

fn harness_with(generator: MockGenerationProvider, cache: Option<EmbeddingCache>) -> Harness {
    let embedder = Arc::new(MockEmbeddingProvider::new(64));
    let generator = Arc::new(generator);
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().chunk_size(60).chunk_overlap(0).top_n(3).build().unwrap();

    let mut builder = QaPipeline::builder()
        .config(config)
        .embedding_provider(embedder.clone())
        .vector_store(store.clone())
        .generation_provider(generator.clone());
    if let Some(cache) = cache {
        builder = builder.embedding_cache(cache);
    }

    Harness { pipeline: builder.build().unwrap(), embedder, generator, store }
}

fn harness() -> Harness {
    harness_with(MockGenerationProvider::new(), None)
}

async fn collect(stream: docqa_rag::TextStream) -> Vec<docqa_rag::Result<String>> {
    stream.collect().await
}

const GEOGRAPHY: &str = "Paris is the capital of France.\n\nBerlin is the capital of Germany.";
const COOKING: &str = "Bread needs flour, water and yeast.\n\nPasta is boiled in salted water.";

#[tokio::test]
async fn ingest_stores_chunks_and_registers_document() {
    let h = harness();

    let chunks = h.pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap();

    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.embedding.len() == 64));
    assert_eq!(chunks.iter().map(|c| c.doc_id).collect::<Vec<_>>(), [0, 1]);
    assert!(h.pipeline.registry().exists("geo.txt").await);
    assert!(h.store.collection_exists("geo.txt").await.unwrap());
    assert_eq!(h.store.len("geo.txt").await, Some(2));
}

#[tokio::test]
async fn ingest_rejects_unnamed_document() {
    let h = harness();
    let err = h.pipeline.ingest(&Document::new("", "text")).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));
    assert!(h.pipeline.registry().is_empty().await);
}

#[tokio::test]
async fn embedding_failure_during_ingest_leaves_document_unregistered() {
    let pipeline = QaPipeline::builder()
        .embedding_provider(Arc::new(MockEmbeddingProvider::failing(8)))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .generation_provider(Arc::new(MockGenerationProvider::new()))
        .build()
        .unwrap();

    let err = pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap_err();

    assert!(matches!(err, RagError::PipelineError(_)));
    assert!(!pipeline.registry().exists("geo.txt").await);
}

#[tokio::test]
async fn ask_answers_from_the_most_relevant_passages() {
    let h = harness();
    h.pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap();
    h.pipeline.ingest(&Document::new("food.txt", COOKING)).await.unwrap();

    let answer = h
        .pipeline
        .ask("What is the capital of France?", &["geo.txt", "food.txt"])
        .await
        .unwrap();

    assert_eq!(answer.context.len(), 3);
    assert_eq!(answer.context.passages()[0], "Paris is the capital of France.");
    let fragments: Vec<String> =
        collect(answer.stream).await.into_iter().map(|f| f.unwrap()).collect();
    assert_eq!(fragments.concat(), "Based on 3 passages: Paris is the capital of France.");

    let (question, context) = h.generator.last_request().await.unwrap();
    assert_eq!(question, "What is the capital of France?");
    assert_eq!(context, answer.context.passages());
}

#[tokio::test]
async fn ask_validates_before_retrieving() {
    let h = harness();
    let none: [&str; 0] = [];

    assert!(matches!(
        h.pipeline.ask("", &["geo.txt"]).await.err(),
        Some(RagError::InvalidRequest(_))
    ));
    assert!(matches!(
        h.pipeline.ask("question", &none).await.err(),
        Some(RagError::InvalidRequest(_))
    ));
    assert!(matches!(
        h.pipeline.ask("question", &["geo.txt"]).await.err(),
        Some(RagError::NoDocuments)
    ));

    h.pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap();
    match h.pipeline.ask("question", &["geo.txt", "missing.pdf"]).await {
        Err(RagError::DocumentNotFound(name)) => assert_eq!(name, "missing.pdf"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected DocumentNotFound"),
    }

    // Only the ingestion embedded anything.
    assert_eq!(h.embedder.calls(), 2);
}

#[tokio::test]
async fn empty_document_yields_an_i_dont_know_answer() {
    let h = harness();
    h.pipeline.ingest(&Document::new("blank.txt", "")).await.unwrap();

    let answer = h.pipeline.ask("anything?", &["blank.txt"]).await.unwrap();

    assert!(answer.context.is_empty());
    let fragments: Vec<String> =
        collect(answer.stream).await.into_iter().map(|f| f.unwrap()).collect();
    assert_eq!(fragments, ["I don't know."]);
}

#[tokio::test]
async fn generation_error_surfaces_as_stream_item() {
    let generator = MockGenerationProvider::with_fragments(["Par", "is"]).failing_after(1);
    let h = harness_with(generator, None);
    h.pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap();

    let answer = h.pipeline.ask("capital?", &["geo.txt"]).await.unwrap();
    let items = collect(answer.stream).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_deref().unwrap(), "Par");
    assert!(matches!(items[1], Err(RagError::GenerationError { .. })));
}

#[tokio::test]
async fn delete_removes_document_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let cache = EmbeddingCache::new(dir.path());
    let h = harness_with(MockGenerationProvider::new(), Some(cache.clone()));
    h.pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap();
    h.pipeline.ingest(&Document::new("food.txt", COOKING)).await.unwrap();
    assert!(cache.load("geo.txt").await.is_some());

    h.pipeline.delete("geo.txt").await.unwrap();

    assert!(!h.pipeline.registry().exists("geo.txt").await);
    assert!(!h.store.collection_exists("geo.txt").await.unwrap());
    assert!(cache.load("geo.txt").await.is_none());
    assert!(matches!(
        h.pipeline.ask("capital?", &["geo.txt"]).await.err(),
        Some(RagError::DocumentNotFound(_))
    ));

    // Unknown names are fine.
    h.pipeline.delete("never-uploaded.txt").await.unwrap();
    assert_eq!(h.pipeline.registry().names().await, ["food.txt"]);
}

#[tokio::test]
async fn cached_embeddings_are_reused_across_pipelines() {
    let dir = tempfile::tempdir().unwrap();

    let cached = || Some(EmbeddingCache::new(dir.path()));

    let first = harness_with(MockGenerationProvider::new(), cached());
    first.pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap();
    assert_eq!(first.embedder.calls(), 2);

    let second = harness_with(MockGenerationProvider::new(), cached());
    let chunks = second.pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap();

    assert_eq!(second.embedder.calls(), 0);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.embedding.len() == 64));
    assert!(second.pipeline.registry().exists("geo.txt").await);
}

#[tokio::test]
async fn stale_cache_entry_is_re_embedded() {
    let dir = tempfile::tempdir().unwrap();
    let cache = EmbeddingCache::new(dir.path());
    cache.save("geo.txt", "0000", &[vec![1.0; 64]]).await.unwrap();

    let h = harness_with(MockGenerationProvider::new(), Some(cache.clone()));
    h.pipeline.ingest(&Document::new("geo.txt", GEOGRAPHY)).await.unwrap();

    assert_eq!(h.embedder.calls(), 2);
    assert_eq!(cache.load("geo.txt").await.map(|entry| entry.embeddings.len()), Some(2));
}

#[tokio::test]
async fn reuploaded_content_is_embedded_afresh() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness_with(MockGenerationProvider::new(), Some(EmbeddingCache::new(dir.path())));
    let bread = "Bread needs flour and yeast.";
    let paris = "Paris is the capital of France.";

    h.pipeline.ingest(&Document::new("a.txt", bread)).await.unwrap();
    let chunks = h.pipeline.ingest(&Document::new("a.txt", paris)).await.unwrap();

    assert_eq!(h.embedder.calls(), 2);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, paris);
    assert_eq!(chunks[0].embedding, h.embedder.embed(paris).await.unwrap());
    assert_ne!(chunks[0].embedding, h.embedder.embed(bread).await.unwrap());
}

#[tokio::test]
async fn builder_requires_all_providers() {
    let result = QaPipeline::builder()
        .embedding_provider(Arc::new(MockEmbeddingProvider::new(8)))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build();
    assert!(matches!(result.err(), Some(RagError::ConfigError(_))));
}
