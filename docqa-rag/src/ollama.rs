//! Ollama embedding and chat providers over the Ollama HTTP API.
//!
//! This module is only available when the `ollama` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::ollama::{OllamaEmbeddingProvider, OllamaGenerationProvider};
//!
//! let embedder = OllamaEmbeddingProvider::new("http://localhost:11434")
//!     .with_model("nomic-embed-text", 768);
//! let generator = OllamaGenerationProvider::new("http://localhost:11434").with_model("llama3");
//! ```

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, TextStream, build_system_prompt};

/// The default Ollama server address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// The default embedding model; used for both chunks and questions.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// The dimensionality of `nomic-embed-text`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "llama3";

const PROVIDER: &str = "Ollama";

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

/// Read an unsuccessful response into an error message.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

// ── Embeddings ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// An [`EmbeddingProvider`] backed by Ollama's `/api/embeddings` endpoint.
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for the Ollama server at `base_url` using
    /// `nomic-embed-text`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }

    /// Use a different embedding model of the given dimensionality.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_err(message: impl Into<String>) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), message: message.into() }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, model = %self.model, text_len = text.len(), "embedding text");

        let response = self
            .client
            .post(endpoint(&self.base_url, "api/embeddings"))
            .json(&EmbeddingRequest { model: &self.model, prompt: text })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                Self::map_err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = PROVIDER, %message, "API error");
            return Err(Self::map_err(message));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::map_err(format!("failed to parse response: {e}"))
        })?;

        if body.embedding.is_empty() {
            let message = format!("model '{}' returned an empty embedding", self.model);
            return Err(Self::map_err(message));
        }
        Ok(body.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Chat ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunkMessage {
    #[serde(default)]
    content: String,
}

/// Parse one NDJSON line of a streaming `/api/chat` response.
///
/// Returns `Ok(None)` for blank lines and the final `done` marker.
fn parse_chat_line(line: &str) -> Result<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| RagError::GenerationError {
        provider: PROVIDER.into(),
        message: format!("malformed stream line: {e}"),
    })?;
    if let Some(message) = chunk.error {
        return Err(RagError::GenerationError { provider: PROVIDER.into(), message });
    }
    Ok(chunk.message.map(|m| m.content).filter(|content| !content.is_empty()))
}

/// Turn a streaming `/api/chat` body into answer fragments.
fn chat_fragments(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(next) = bytes.next().await {
            let next = next.map_err(|e| RagError::GenerationError {
                provider: PROVIDER.into(),
                message: format!("stream interrupted: {e}"),
            })?;
            buffer.extend_from_slice(&next);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).into_owned();
                if let Some(fragment) = parse_chat_line(&line)? {
                    yield fragment;
                }
            }
        }
        let rest = String::from_utf8_lossy(&buffer).into_owned();
        if let Some(fragment) = parse_chat_line(&rest)? {
            yield fragment;
        }
    }
}

/// A [`GenerationProvider`] streaming from Ollama's `/api/chat` endpoint.
pub struct OllamaGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerationProvider {
    /// Create a provider for the Ollama server at `base_url` using `llama3`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: DEFAULT_CHAT_MODEL.into(),
        }
    }

    /// Use a different chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerationProvider {
    async fn generate(&self, question: &str, context: &[String]) -> Result<TextStream> {
        let system_prompt = build_system_prompt(context);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &system_prompt },
                ChatMessage { role: "user", content: question },
            ],
            stream: true,
        };

        debug!(provider = PROVIDER, model = %self.model, passages = context.len(), "starting chat");
        let response = self
            .client
            .post(endpoint(&self.base_url, "api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "chat request failed");
                RagError::GenerationError {
                    provider: PROVIDER.into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = PROVIDER, %message, "chat API error");
            return Err(RagError::GenerationError { provider: PROVIDER.into(), message });
        }

        Ok(Box::pin(chat_fragments(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(endpoint("http://h:11434/", "api/chat"), "http://h:11434/api/chat");
        assert_eq!(endpoint("http://h:11434", "api/embeddings"), "http://h:11434/api/embeddings");
    }

    #[test]
    fn parses_stream_lines() {
        let line =
            r#"{"model":"llama3","message":{"role":"assistant","content":"Par"},"done":false}"#;
        assert_eq!(parse_chat_line(line).unwrap(), Some("Par".to_string()));
        let done = r#"{"model":"llama3","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_chat_line(done).unwrap(), None);
        assert_eq!(parse_chat_line("   ").unwrap(), None);
    }

    #[test]
    fn stream_errors_surface() {
        let err = parse_chat_line(r#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert!(matches!(
            err,
            RagError::GenerationError { message, .. } if message.contains("not found")
        ));
        assert!(parse_chat_line("{not json").is_err());
    }

    #[test]
    fn embedding_defaults_use_one_model() {
        let provider = OllamaEmbeddingProvider::new(DEFAULT_OLLAMA_URL);
        assert_eq!(provider.model(), DEFAULT_EMBEDDING_MODEL);
        assert_eq!(provider.dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);
    }
}
