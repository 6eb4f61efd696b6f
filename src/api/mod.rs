//! REST API server for voicecheck.
//!
//! Provides HTTP endpoints for:
//! - Recording control (start, stop, status)
//! - Playback control (load, play, stop)
//! - The diagnostics feed

pub mod error;
pub mod routes;

use crate::config::Config;
use crate::session::VoiceSession;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

pub use routes::ApiState;

pub struct ApiServer {
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(session: Arc<VoiceSession>, config: &Config) -> Self {
        Self {
            port: config.api.port,
            state: ApiState { session },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(service_info))
            .route("/version", get(version))
            .merge(routes::recording::router(self.state.clone()))
            .merge(routes::playback::router(self.state.clone()))
            .merge(routes::diagnostics::router(self.state.clone()))
            .layer(ServiceBuilder::new())
    }

    pub async fn start(self) -> Result<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                 - Service info");
        info!("  GET  /version          - Get version info");
        info!("  GET  /status           - Get recording/playback status");
        info!("  POST /recording/start  - Start recording");
        info!("  POST /recording/stop   - Stop recording");
        info!("  POST /playback/load    - Load a recording (default: last)");
        info!("  POST /playback/play    - Play the loaded recording");
        info!("  POST /playback/stop    - Stop playback");
        info!("  GET  /diagnostics      - Diagnostic events (?limit=N)");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "voicecheck",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "voicecheck"
    }))
}
