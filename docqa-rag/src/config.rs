//! Configuration for ingestion and retrieval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the question-answering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Neighbours fetched from each collection per question (`k`).
    pub neighbors_per_collection: usize,
    /// Chunks kept after merging all collections (`top_n`).
    pub top_n: usize,
    /// Upper bound for a single collection query, in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 50,
            neighbors_per_collection: 5,
            top_n: 7,
            query_timeout_ms: 10_000,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The per-collection query timeout as a [`Duration`].
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set how many neighbours each collection contributes to the candidate pool.
    pub fn neighbors_per_collection(mut self, k: usize) -> Self {
        self.config.neighbors_per_collection = k;
        self
    }

    /// Set how many chunks survive the merge.
    pub fn top_n(mut self, n: usize) -> Self {
        self.config.top_n = n;
        self
    }

    /// Set the per-collection query timeout.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `neighbors_per_collection == 0`
    /// - `top_n == 0`
    /// - `query_timeout_ms == 0`
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".into()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.neighbors_per_collection == 0 {
            return Err(RagError::ConfigError(
                "neighbors_per_collection must be greater than zero".into(),
            ));
        }
        if config.top_n == 0 {
            return Err(RagError::ConfigError("top_n must be greater than zero".into()));
        }
        if config.query_timeout_ms == 0 {
            return Err(RagError::ConfigError("query_timeout must be greater than zero".into()));
        }
        Ok(config)
    }
}
