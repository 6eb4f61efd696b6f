//! Playback control endpoints.

use super::ApiState;
use crate::api::error::ApiResult;
use crate::audio::PlaybackSession;
use axum::{extract::State, response::Json, routing::post, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

/// Request body for the load endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadRequest {
    /// Recording to load. Defaults to the last completed recording.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/playback/load", post(load))
        .route("/playback/play", post(play))
        .route("/playback/stop", post(stop))
        .with_state(state)
}

async fn load(
    State(state): State<ApiState>,
    body: Option<Json<LoadRequest>>,
) -> ApiResult<Json<Value>> {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    info!("Load playback command received via API: {:?}", request.path);

    let session = match request.path {
        Some(path) => state.session.load(path).await?,
        None => state.session.load_last_recording().await?,
    };

    Ok(Json(session_json(&session)))
}

async fn play(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    info!("Play command received via API");
    state.session.play().await?;
    Ok(Json(json!({ "success": true, "playback": "playing" })))
}

async fn stop(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    info!("Stop playback command received via API");
    state.session.stop_playback().await?;
    Ok(Json(json!({ "success": true, "playback": "idle" })))
}

fn session_json(session: &PlaybackSession) -> Value {
    json!({
        "success": true,
        "source_file_path": session.source_file_path,
        "state": session.state.as_str(),
        "duration_ms": session.duration_ms,
    })
}
