//! Question-answering pipeline orchestrator.
//!
//! [`QaPipeline`] ties the pieces together:
//!
//! - **ingest**: chunk → embed (cache-aware) → store → register
//! - **ask**: validate → retrieve across documents → stream an answer
//! - **delete**: drop the collection, the registry entry and cached vectors
//!
//! One [`EmbeddingProvider`] serves both ingestion and questions, so stored
//! chunks and queries always share an embedding space.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{Document, InMemoryVectorStore, QaPipeline, RagConfig, RecursiveChunker};
//!
//! let pipeline = QaPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .generation_provider(Arc::new(generator))
//!     .build()?;
//!
//! pipeline.ingest(&Document::new("guide.txt", text)).await?;
//! let answer = pipeline.ask("How do I install it?", &["guide.txt"]).await?;
//! ```

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cache::{EmbeddingCache, content_digest};
use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Document};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, TextStream};
use crate::registry::DocumentRegistry;
use crate::retrieval::{RankedContext, RetrievalMerger};
use crate::vectorstore::VectorStore;

/// An answer stream together with the context it was generated from.
pub struct Answer {
    /// The passages handed to the generation provider.
    pub context: RankedContext,
    /// Answer fragments, pulled lazily.
    pub stream: TextStream,
}

/// The document question-answering pipeline.
///
/// Construct one via [`QaPipeline::builder()`].
pub struct QaPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    generation_provider: Arc<dyn GenerationProvider>,
    registry: Arc<DocumentRegistry>,
    cache: Option<EmbeddingCache>,
    merger: RetrievalMerger,
}

impl QaPipeline {
    /// Create a new [`QaPipelineBuilder`].
    pub fn builder() -> QaPipelineBuilder {
        QaPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the registry of processed documents.
    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Ingest a document into the collection named after it.
    ///
    /// Re-ingesting a name replaces chunks with matching `doc_id`s. The
    /// document is registered only after its chunks are stored. Returns the
    /// stored chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if embedding or storage fails.
    pub async fn ingest(&self, document: &Document) -> Result<Vec<Chunk>> {
        let name = document.id.as_str();
        if name.is_empty() {
            return Err(RagError::InvalidRequest("document id must not be empty".into()));
        }

        let mut chunks = self.chunker.chunk(document);
        let embeddings = self.embed_chunks(name, &chunks).await?;
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        let dimensions = self.embedding_provider.dimensions();
        self.vector_store.create_collection(name, dimensions).await.map_err(|e| {
            error!(document = name, error = %e, "failed to create collection");
            RagError::PipelineError(format!("failed to create collection '{name}': {e}"))
        })?;
        if !chunks.is_empty() {
            self.vector_store.add(name, &chunks).await.map_err(|e| {
                error!(document = name, error = %e, "failed to store chunks");
                RagError::PipelineError(format!("failed to store chunks for '{name}': {e}"))
            })?;
        }

        self.registry.register(name).await;
        info!(document = name, chunk_count = chunks.len(), "ingested document");
        Ok(chunks)
    }

    /// Embed chunk texts, reusing cached vectors computed from the same texts.
    async fn embed_chunks(&self, name: &str, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        if let Some(cache) = &self.cache {
            match cache.load(name).await {
                Some(entry) if entry.matches(&texts) => return Ok(entry.embeddings),
                Some(entry) => warn!(
                    document = name,
                    cached = entry.embeddings.len(),
                    chunks = chunks.len(),
                    "cached embeddings are stale, re-embedding"
                ),
                None => {}
            }
        }

        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(document = name, error = %e, "embedding failed during ingestion");
            RagError::PipelineError(format!("embedding failed for document '{name}': {e}"))
        })?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(name, &content_digest(&texts), &embeddings).await {
                warn!(document = name, error = %e, "failed to cache embeddings");
            }
        }
        Ok(embeddings)
    }

    /// Remove a document: its collection, registry entry and cached vectors.
    ///
    /// Deleting an unknown document is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the vector store cannot drop the
    /// collection.
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.vector_store.delete_collection(name).await.map_err(|e| {
            error!(document = name, error = %e, "failed to delete collection");
            RagError::PipelineError(format!("failed to delete collection '{name}': {e}"))
        })?;
        self.registry.unregister(name).await;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(name).await {
                warn!(document = name, error = %e, "failed to remove cached embeddings");
            }
        }
        info!(document = name, "deleted document");
        Ok(())
    }

    /// Retrieve ranked context for `question` across `documents`.
    ///
    /// # Errors
    ///
    /// See [`RetrievalMerger::retrieve`].
    pub async fn retrieve<S>(&self, question: &str, documents: &[S]) -> Result<RankedContext>
    where
        S: AsRef<str> + Sync,
    {
        self.merger.retrieve(question, documents).await
    }

    /// Answer `question` from the named documents.
    ///
    /// Retrieval finishes before this returns, so an embedding failure is
    /// reported here rather than as an empty answer.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidRequest`] if the question or document list is empty
    /// - [`RagError::NoDocuments`] if nothing has been ingested
    /// - [`RagError::DocumentNotFound`] for the first unknown document
    /// - the embedding provider's error if the question cannot be embedded
    /// - the generation provider's error if it cannot start answering
    pub async fn ask<S>(&self, question: &str, documents: &[S]) -> Result<Answer>
    where
        S: AsRef<str> + Sync,
    {
        if question.trim().is_empty() || documents.is_empty() {
            return Err(RagError::InvalidRequest(
                "Question and file_names are required".to_string(),
            ));
        }
        if self.registry.is_empty().await {
            return Err(RagError::NoDocuments);
        }
        for name in documents {
            if !self.registry.exists(name.as_ref()).await {
                return Err(RagError::DocumentNotFound(name.as_ref().to_string()));
            }
        }

        let context = self.retrieve(question, documents).await?;
        let stream =
            self.generation_provider.generate(question, context.passages()).await.map_err(|e| {
                error!(error = %e, "generation failed to start");
                e
            })?;
        Ok(Answer { context, stream })
    }
}

/// Builder for constructing a [`QaPipeline`].
///
/// `embedding_provider`, `vector_store` and `generation_provider` are
/// required. The config defaults to [`RagConfig::default()`], the chunker to
/// a [`RecursiveChunker`] sized from the config, and the registry to a fresh
/// one. Without an [`EmbeddingCache`] every ingestion embeds from scratch.
#[derive(Default)]
pub struct QaPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    registry: Option<Arc<DocumentRegistry>>,
    cache: Option<EmbeddingCache>,
}

impl QaPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for both chunks and questions.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the answer generator.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Share an existing document registry.
    pub fn registry(mut self, registry: Arc<DocumentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Cache chunk embeddings on disk.
    pub fn embedding_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the [`QaPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<QaPipeline> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::ConfigError("generation_provider is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });
        let registry = self.registry.unwrap_or_default();

        let merger = RetrievalMerger::new(embedding_provider.clone(), vector_store.clone())
            .with_registry(registry.clone())
            .with_config(&config);

        Ok(QaPipeline {
            config,
            embedding_provider,
            vector_store,
            chunker,
            generation_provider,
            registry,
            cache: self.cache,
            merger,
        })
    }
}
