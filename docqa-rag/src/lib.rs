//! # docqa-rag
//!
//! Question answering over uploaded documents.
//!
//! ## Overview
//!
//! Each uploaded document is chunked, embedded and stored in its own vector
//! collection. A question is embedded once, every requested collection is
//! searched with that vector, and the hits are merged into a single ranked
//! context that is handed to a language model which streams the answer.
//!
//! - [`QaPipeline`] - ingest, delete and ask
//! - [`RetrievalMerger`] - the multi-collection search and ranking step
//! - [`DocumentRegistry`] - which documents are ready to be asked about
//! - [`EmbeddingProvider`], [`VectorStore`], [`GenerationProvider`] - the
//!   external services, behind traits
//!
//! ## Backends
//!
//! | Feature | Provides |
//! |---------|----------|
//! | `ollama` (default) | [`ollama::OllamaEmbeddingProvider`], [`ollama::OllamaGenerationProvider`] |
//! | `chroma` (default) | [`chroma::ChromaVectorStore`] |
//! | `qdrant` | `qdrant::QdrantVectorStore` |
//! | `mock` | `mock::MockEmbeddingProvider`, `mock::MockGenerationProvider` |
//!
//! [`InMemoryVectorStore`] and the `mock` providers need no services.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{Document, InMemoryVectorStore, QaPipeline};
//! use docqa_rag::mock::{MockEmbeddingProvider, MockGenerationProvider};
//!
//! let pipeline = QaPipeline::builder()
//!     .embedding_provider(Arc::new(MockEmbeddingProvider::new(64)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .generation_provider(Arc::new(MockGenerationProvider::new()))
//!     .build()?;
//!
//! pipeline.ingest(&Document::new("geo.txt", "Paris is the capital of France.")).await?;
//! let answer = pipeline.ask("What is the capital of France?", &["geo.txt"]).await?;
//! ```

pub mod cache;
#[cfg(feature = "chroma")]
pub mod chroma;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod inmemory;
#[cfg(feature = "mock")]
pub mod mock;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod pipeline;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod registry;
pub mod retrieval;
pub mod vectorstore;

pub use cache::{CacheEntry, EmbeddingCache, content_digest};
pub use chunking::{Chunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, Neighbor};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use extract::{DocumentFormat, extract_bytes, extract_text};
pub use generation::{GenerationProvider, TextStream, build_system_prompt};
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{Answer, QaPipeline, QaPipelineBuilder};
pub use registry::{DocumentRecord, DocumentRegistry};
pub use retrieval::{CollectionFailure, RankedContext, RetrievalMerger, merge_ranked};
pub use vectorstore::VectorStore;
