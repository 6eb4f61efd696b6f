//! Diagnostics feed routes.

use super::ApiState;
use crate::diagnostics::DiagnosticEvent;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

/// Query parameters for the diagnostics feed.
#[derive(Debug, Deserialize, Default)]
pub struct DiagnosticsQueryParams {
    /// Number of most recent events (default 50)
    pub limit: Option<usize>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/diagnostics", get(get_diagnostics))
        .with_state(state)
}

/// GET /diagnostics - Most recent diagnostic events, oldest first.
async fn get_diagnostics(
    State(state): State<ApiState>,
    Query(params): Query<DiagnosticsQueryParams>,
) -> Json<Vec<DiagnosticEvent>> {
    let limit = params.limit.unwrap_or(50);
    Json(state.session.diagnostics().tail(limit))
}
