//! Server settings, read from `DOCQA_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use docqa_rag::RagConfig;
use docqa_rag::chroma::DEFAULT_CHROMA_URL;
use docqa_rag::ollama::{
    DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL, DEFAULT_OLLAMA_URL,
};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where uploaded files are written.
    pub upload_dir: PathBuf,
    /// Where chunk embeddings are cached between runs.
    pub embeddings_dir: PathBuf,
    pub ollama_url: String,
    pub chroma_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub chat_model: String,
    /// Passages handed to the model per question.
    pub top_n: usize,
    /// Neighbours requested from each document.
    pub neighbors_per_collection: usize,
    pub query_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let rag = RagConfig::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            embeddings_dir: PathBuf::from("embeddings"),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            chroma_url: DEFAULT_CHROMA_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            top_n: rag.top_n,
            neighbors_per_collection: rag.neighbors_per_collection,
            query_timeout: rag.query_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load settings from the process environment, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, falling back to defaults for unset keys.
    ///
    /// Unset and empty values fall back to the default; values that are set
    /// but do not parse are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let timeout_secs: u64 = parse_or(
            "DOCQA_QUERY_TIMEOUT_SECS",
            var("DOCQA_QUERY_TIMEOUT_SECS"),
            defaults.query_timeout.as_secs(),
        )?;

        Ok(Self {
            host: var("DOCQA_HOST").unwrap_or(defaults.host),
            port: parse_or("DOCQA_PORT", var("DOCQA_PORT"), defaults.port)?,
            upload_dir: var("DOCQA_UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            embeddings_dir: var("DOCQA_EMBEDDINGS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.embeddings_dir),
            ollama_url: var("DOCQA_OLLAMA_URL").unwrap_or(defaults.ollama_url),
            chroma_url: var("DOCQA_CHROMA_URL").unwrap_or(defaults.chroma_url),
            embedding_model: var("DOCQA_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimensions: parse_or(
                "DOCQA_EMBEDDING_DIMENSIONS",
                var("DOCQA_EMBEDDING_DIMENSIONS"),
                defaults.embedding_dimensions,
            )?,
            chat_model: var("DOCQA_CHAT_MODEL").unwrap_or(defaults.chat_model),
            top_n: parse_or("DOCQA_TOP_N", var("DOCQA_TOP_N"), defaults.top_n)?,
            neighbors_per_collection: parse_or(
                "DOCQA_K",
                var("DOCQA_K"),
                defaults.neighbors_per_collection,
            )?,
            query_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// The pipeline settings derived from this configuration.
    pub fn rag_config(&self) -> docqa_rag::Result<RagConfig> {
        RagConfig::builder()
            .top_n(self.top_n)
            .neighbors_per_collection(self.neighbors_per_collection)
            .query_timeout(self.query_timeout)
            .build()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw}")),
        None => Ok(default),
    }
}
