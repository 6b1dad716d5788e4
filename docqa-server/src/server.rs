use std::{
    convert::Infallible,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use async_stream::stream;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use docqa_rag::{
    Document, EmbeddingCache, QaPipeline,
    chroma::ChromaVectorStore,
    extract_text,
    ollama::{OllamaEmbeddingProvider, OllamaGenerationProvider},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::{Stream, StreamExt};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::{config::ServerConfig, error::ApiError};

/// Uploads larger than this are rejected before they reach a handler.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QaPipeline>,
    pub upload_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(pipeline: Arc<QaPipeline>, upload_dir: impl Into<PathBuf>) -> Self {
        Self { pipeline, upload_dir: Arc::new(upload_dir.into()) }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub file_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of `POST /ask-question/`. Missing fields are reported as a 400 by
/// the pipeline's own validation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub file_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub file_name: String,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/upload-file/", post(upload_file))
        .route("/process-file/", post(process_file))
        .route("/ask-question/", post(ask_question))
        .route("/delete-file/", post(delete_file))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Wire the Ollama providers, the Chroma store and the embedding cache.
pub fn build_pipeline(config: &ServerConfig) -> anyhow::Result<QaPipeline> {
    let embedder = OllamaEmbeddingProvider::new(config.ollama_url.clone())
        .with_model(config.embedding_model.clone(), config.embedding_dimensions);
    let generator = OllamaGenerationProvider::new(config.ollama_url.clone())
        .with_model(config.chat_model.clone());

    let pipeline = QaPipeline::builder()
        .config(config.rag_config()?)
        .embedding_provider(Arc::new(embedder))
        .vector_store(Arc::new(ChromaVectorStore::new(config.chroma_url.clone())))
        .generation_provider(Arc::new(generator))
        .embedding_cache(EmbeddingCache::new(config.embeddings_dir.clone()))
        .build()?;
    Ok(pipeline)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("cannot create upload dir {}", config.upload_dir.display()))?;

    let pipeline = build_pipeline(&config)?;
    let app = app_router(AppState::new(Arc::new(pipeline), config.upload_dir.clone()));
    let addr: SocketAddr =
        config.bind_address().parse().with_context(|| "invalid host/port for docqa server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        ollama = %config.ollama_url,
        chroma = %config.chroma_url,
        "docqa listening on http://{}",
        addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}

/// Reduce a client-supplied file name to its final path component.
///
/// Returns `None` when nothing usable is left.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status":"ok","service":"docqa"}))
}

/// Pull the `file` part out of a multipart body.
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| ApiError::BadRequest("uploaded file has no usable name".into()))?;
        let data = field.bytes().await?;
        return Ok((name, data));
    }
    Err(ApiError::BadRequest("missing multipart field 'file'".into()))
}

async fn save_upload(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf, ApiError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, data).await?;
    Ok(path)
}

async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (filename, data) = read_upload(&mut multipart).await?;
    let path = save_upload(&state.upload_dir, &filename, &data).await?;
    info!(file = %filename, bytes = data.len(), "saved upload");

    Ok(Json(UploadResponse { filename, file_path: path.display().to_string() }))
}

async fn process_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let (filename, data) = read_upload(&mut multipart).await?;
    let path = save_upload(&state.upload_dir, &filename, &data).await?;

    let processing_failed = |e: docqa_rag::RagError| {
        error!(file = %filename, error = %e, "failed to process file");
        ApiError::Internal(e.to_string())
    };
    let text = extract_text(&path).await.map_err(processing_failed)?;
    let document =
        Document::new(filename.as_str(), text).with_source_uri(path.display().to_string());
    state.pipeline.ingest(&document).await.map_err(processing_failed)?;

    Ok(Json(MessageResponse {
        message: "File processed and embeddings stored successfully".to_string(),
    }))
}

async fn ask_question(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let file_names: Vec<String> = request
        .file_names
        .iter()
        .map(|raw| sanitize_file_name(raw).unwrap_or_else(|| raw.clone()))
        .collect();

    let answer = state.pipeline.ask(&request.question, &file_names).await.map_err(|e| {
        if !e.is_client_error() {
            error!(error = %e, "failed to answer question");
        }
        ApiError::from(e)
    })?;
    info!(
        documents = file_names.len(),
        passages = answer.context.len(),
        skipped = answer.context.failures().len(),
        "streaming answer"
    );

    let mut fragments = answer.stream;
    let events = stream! {
        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) => {
                    yield Ok(Event::default().event("message").data(text.replace('\r', "")));
                }
                Err(e) => {
                    error!(error = %e, "answer stream failed");
                    let message = e.to_string().replace('\r', "");
                    yield Ok(Event::default().event("error").data(message));
                    break;
                }
            }
        }
    };

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive")))
}

async fn delete_file(
    State(state): State<AppState>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let name = sanitize_file_name(&query.file_name)
        .ok_or_else(|| ApiError::BadRequest("file_name is required".into()))?;

    match tokio::fs::remove_file(state.upload_dir.join(&name)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    state.pipeline.delete(&name).await?;

    Ok(Json(MessageResponse {
        message: "File and associated data deleted successfully".to_string(),
    }))
}
