//! Recording control endpoints.
//!
//! Provides HTTP endpoints for:
//! - Starting a recording (POST /recording/start)
//! - Stopping a recording (POST /recording/stop)
//! - Getting session status (GET /status)

use super::ApiState;
use crate::api::error::ApiResult;
use crate::audio::{CompletedRecording, SessionStatus};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::info;

/// Creates the recording router with all recording-related endpoints.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(session_status))
        .route("/recording/start", post(start_recording))
        .route("/recording/stop", post(stop_recording))
        .with_state(state)
}

/// Starts a recording with the configured level settings.
///
/// Any playback in progress is stopped first.
async fn start_recording(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    info!("Start recording command received via API");
    let session = state.session.start_recording().await?;

    Ok(Json(json!({
        "success": true,
        "id": session.id,
        "file_path": session.file_path,
        "started_at": session.started_at.to_rfc3339(),
        "state": session.state.as_str(),
    })))
}

/// Stops the active recording.
///
/// # Response
/// The finalized recording. `empty` is true when the file holds no audio; the
/// reason is in the diagnostics feed.
async fn stop_recording(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    info!("Stop recording command received via API");
    let completed = state.session.stop_recording().await?;

    Ok(Json(json!({
        "success": true,
        "recording": completed_json(&completed),
    })))
}

/// Gets the current recording and playback status.
async fn session_status(State(state): State<ApiState>) -> Json<Value> {
    let status = state.session.status().await;
    Json(status_json(&status))
}

pub fn status_json(status: &SessionStatus) -> Value {
    let active = status.active_recording.as_ref().map(|session| {
        json!({
            "id": session.id,
            "file_path": session.file_path,
            "started_at": session.started_at.to_rfc3339(),
        })
    });

    json!({
        "recording": status.recording.as_str(),
        "playback": status.playback.as_str(),
        "level": status.level,
        "classification": status.classification.as_str(),
        "active_recording": active,
        "last_recording": status.last_recording.as_ref().map(completed_json),
        "loaded_source": status.loaded_source,
        "last_error": status.last_error,
    })
}

fn completed_json(recording: &CompletedRecording) -> Value {
    json!({
        "id": recording.id,
        "file_path": recording.file_path,
        "duration_ms": recording.duration_ms,
        "size_bytes": recording.size_bytes,
        "empty": recording.is_empty(),
    })
}
