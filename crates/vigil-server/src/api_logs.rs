//! History API for the event log.

use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_log::{recent_events, LogFrame, DEFAULT_HISTORY_LIMIT};

/// Query parameters for `GET /api/logs/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of events to return (default: 200, max: 1000).
    pub limit: Option<i64>,
}

/// Response wrapper for the history query.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Matching events, oldest first, in the live-feed frame shape.
    pub logs: Vec<LogFrame>,
}

/// Handler for `GET /api/logs/history`.
///
/// Returns the newest events in chronological order so a freshly
/// connected viewer can backfill before its live frames start arriving.
/// A storage failure is surfaced as a 500 so the UI can show a degraded
/// state; it never panics the server.
pub async fn get_history_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, Response> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(0, 1000);
    let pool = state.pool.clone();

    let events = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        recent_events(&conn, limit).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal_error(format!("task join error: {e}")))?
    .map_err(internal_error)?;

    let logs = events.iter().map(|event| event.to_frame()).collect();
    Ok(Json(HistoryResponse { logs }))
}

fn internal_error(message: String) -> Response {
    tracing::error!(error = %message, "history query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}
