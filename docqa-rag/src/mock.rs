//! Deterministic providers for tests and offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, TextStream};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Embeds text as a hashed bag of lower-cased words.
///
/// Texts sharing words end up close in cosine distance, which is enough to
/// exercise ranking end to end. Exact vectors can be pinned per text.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    pinned: HashMap<String, Vec<f32>>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a provider producing vectors of `dimensions` entries.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            pinned: HashMap::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails.
    pub fn failing(dimensions: usize) -> Self {
        Self { fail: true, ..Self::new(dimensions) }
    }

    /// Return `vector` whenever `text` is embedded.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), vector);
        self
    }

    /// How many texts have been embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bag_of_words(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let bucket = word.to_lowercase().bytes().fold(FNV_OFFSET, |hash, byte| {
                (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
            });
            vector[(bucket % self.dimensions as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::EmbeddingError {
                provider: "Mock".into(),
                message: "embedding provider unavailable".into(),
            });
        }
        Ok(self.pinned.get(text).cloned().unwrap_or_else(|| self.bag_of_words(text)))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Streams a canned answer and remembers the context it was given.
#[derive(Debug, Default)]
pub struct MockGenerationProvider {
    fragments: Option<Vec<String>>,
    fail_after: Option<usize>,
    last_request: Mutex<Option<(String, Vec<String>)>>,
}

impl MockGenerationProvider {
    /// Answer with a summary of the received context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with exactly these fragments.
    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { fragments: Some(fragments.into_iter().map(Into::into).collect()), ..Self::default() }
    }

    /// Emit an error item after `count` fragments.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// The question and context of the most recent call.
    pub async fn last_request(&self) -> Option<(String, Vec<String>)> {
        self.last_request.lock().await.clone()
    }
}

#[async_trait]
impl GenerationProvider for MockGenerationProvider {
    async fn generate(&self, question: &str, context: &[String]) -> Result<TextStream> {
        *self.last_request.lock().await = Some((question.to_string(), context.to_vec()));

        let fragments = self.fragments.clone().unwrap_or_else(|| {
            if context.is_empty() {
                vec!["I don't know.".to_string()]
            } else {
                vec![format!("Based on {} passages: ", context.len()), context[0].clone()]
            }
        });

        let mut items: Vec<Result<String>> = fragments.into_iter().map(Ok).collect();
        if let Some(count) = self.fail_after {
            items.truncate(count);
            items.push(Err(RagError::GenerationError {
                provider: "Mock".into(),
                message: "stream interrupted".into(),
            }));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::inmemory::cosine_distance;

    #[tokio::test]
    async fn shared_words_are_closer() {
        let provider = MockEmbeddingProvider::new(64);
        let q = provider.embed("capital of France").await.unwrap();
        let near = provider.embed("Paris is the capital of France").await.unwrap();
        let far = provider.embed("Rust borrow checker rules").await.unwrap();
        assert!(cosine_distance(&q, &near) < cosine_distance(&q, &far));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn failing_provider_errors() {
        let provider = MockEmbeddingProvider::failing(8);
        assert!(matches!(provider.embed("x").await, Err(RagError::EmbeddingError { .. })));
    }

    #[tokio::test]
    async fn generation_records_context_and_streams() {
        let provider = MockGenerationProvider::with_fragments(["Par", "is"]);
        let stream = provider.generate("capital?", &["ctx".to_string()]).await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "Paris");
        assert_eq!(
            provider.last_request().await,
            Some(("capital?".to_string(), vec!["ctx".to_string()]))
        );
    }
}
