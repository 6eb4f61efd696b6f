//! API error handling for consistent JSON error responses.

use crate::audio::{PlaybackError, RecordingError};
use crate::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::Recording(RecordingError::PermissionDenied) => StatusCode::FORBIDDEN,
            SessionError::Recording(RecordingError::InvalidSettings(_))
            | SessionError::Settings(_) => StatusCode::BAD_REQUEST,
            SessionError::Recording(
                RecordingError::NoActiveRecording | RecordingError::Cancelled,
            )
            | SessionError::Playback(PlaybackError::AlreadyPlaying | PlaybackError::NotLoaded)
            | SessionError::RecordingInProgress => StatusCode::CONFLICT,
            SessionError::Playback(PlaybackError::SourceMissing { .. })
            | SessionError::NoRecording => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
