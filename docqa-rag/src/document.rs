//! Data types for documents, chunks, and nearest-neighbour hits.

use serde::{Deserialize, Serialize};

/// An uploaded source document after text extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Document identifier. Also the name of its collection.
    pub id: String,
    /// The extracted text content.
    pub text: String,
    /// Optional path or URI of the original upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document from its identifier and extracted text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), source_uri: None }
    }

    /// Attach the location of the original upload.
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }
}

/// A contiguous span of a [`Document`]'s text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Store-level identifier (the decimal form of `doc_id`).
    pub id: String,
    /// Sequence index of this chunk within its document.
    pub doc_id: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Embedding of `text`; empty until the pipeline attaches one.
    pub embedding: Vec<f32>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// Create an un-embedded chunk at position `doc_id` of `document_id`.
    pub fn new(document_id: impl Into<String>, doc_id: usize, text: impl Into<String>) -> Self {
        Self {
            id: doc_id.to_string(),
            doc_id,
            text: text.into(),
            embedding: Vec::new(),
            document_id: document_id.into(),
        }
    }
}

/// One nearest-neighbour hit from a single collection.
///
/// `distance` is a cosine distance in `[0, 2]`; lower means more similar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Neighbor {
    /// Distance between the query vector and the chunk's embedding.
    pub distance: f32,
    /// Text of the matching chunk.
    pub text: String,
}

impl Neighbor {
    /// Create a hit from a distance and its chunk text.
    pub fn new(distance: f32, text: impl Into<String>) -> Self {
        Self { distance, text: text.into() }
    }
}

impl From<(f32, &str)> for Neighbor {
    fn from((distance, text): (f32, &str)) -> Self {
        Self::new(distance, text)
    }
}
