//! `docqa-server` exposes the docqa pipeline over HTTP: upload and process
//! documents, then ask questions whose answers stream back as SSE.

pub mod config;
pub mod error;
pub mod server;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{AppState, app_router, build_pipeline, run_server};
