//! Error types for the `docqa-rag` crate.

use thiserror::Error;

/// Errors that can occur while ingesting documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding provider could not produce a vector.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The requested collection does not exist in the vector store.
    ///
    /// Kept separate from [`RagError::VectorStoreError`] so callers can tell a
    /// missing namespace apart from an empty one.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// A per-collection query did not finish within the configured timeout.
    #[error("Query against collection '{collection}' timed out after {timeout_ms} ms")]
    QueryTimeout {
        /// The collection that was being queried.
        collection: String,
        /// The timeout that elapsed.
        timeout_ms: u128,
    },

    /// The generation provider failed to start or continue an answer.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Text could not be extracted from an uploaded file.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// The file extension has no registered extractor.
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The caller supplied an unusable request (empty question, no documents).
    ///
    /// The message is shown to clients as is.
    #[error("{0}")]
    InvalidRequest(String),

    /// No document has been registered yet.
    #[error("No file uploaded")]
    NoDocuments,

    /// A document named in a request is not registered.
    #[error("File not found: {0}")]
    DocumentNotFound(String),

    /// An error in the ingest/ask orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the error was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RagError::InvalidRequest(_)
                | RagError::NoDocuments
                | RagError::DocumentNotFound(_)
                | RagError::UnsupportedFormat(_)
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_shows_bare_message() {
        let err = RagError::InvalidRequest("Question and file_names are required".into());
        assert_eq!(err.to_string(), "Question and file_names are required");
        assert!(err.is_client_error());
    }
}
