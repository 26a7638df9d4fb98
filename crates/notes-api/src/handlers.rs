//! Route handler functions for the monitoring endpoints.
//!
//! Health endpoints never fail because a backend is down; they report it as
//! `unhealthy`. Count and stats pass adapter errors through `ApiError`.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use notes_core::types::{BackendHealth, BackendKind, HealthStatus, NoteStats};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DbParams {
    pub db: Option<String>,
}

impl DbParams {
    /// The requested backend; unknown names are a 400.
    fn backend(&self) -> Result<Option<BackendKind>, ApiError> {
        self.db
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| name.parse::<BackendKind>())
            .transpose()
            .map_err(ApiError::from)
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub notes: u64,
    pub checked_at: DateTime<Utc>,
}

impl From<BackendHealth> for HealthResponse {
    fn from(health: BackendHealth) -> Self {
        Self {
            status: health.status,
            notes: health.note_count,
            checked_at: health.checked_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendResponse {
    pub backend: BackendKind,
    #[serde(default)]
    pub uptime_secs: u64,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health?db=<name> - probe one backend (the active one by default).
pub async fn health(
    State(state): State<AppState>,
    Query(params): Query<DbParams>,
) -> Result<Json<HealthResponse>, ApiError> {
    let kind = match params.backend()? {
        Some(kind) => kind,
        None => state.selector.current_kind().await,
    };
    let health = state.monitor.health(kind).await;
    Ok(Json(health.into()))
}

/// GET /health/all - probe every monitored backend concurrently.
pub async fn health_all(State(state): State<AppState>) -> Json<BTreeMap<BackendKind, BackendHealth>> {
    Json(state.monitor.health_all().await)
}

/// GET /count - number of notes in the active backend.
pub async fn count(State(state): State<AppState>) -> Result<Json<u64>, ApiError> {
    Ok(Json(state.monitor.count().await?))
}

/// GET /count/html - the same count as a small HTML page.
pub async fn count_html(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let backend = state.selector.current_kind().await;
    let count = state.monitor.count().await?;
    Ok(Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Notes count</title></head>\n<body>\n\
         <table>\n<tr><th>Backend</th><th>Notes</th></tr>\n\
         <tr><td>{}</td><td>{}</td></tr>\n</table>\n</body>\n</html>\n",
        backend, count
    )))
}

/// GET /stats?db=<name> - aggregate counts for one backend.
pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<DbParams>,
) -> Result<Json<NoteStats>, ApiError> {
    let kind = params.backend()?;
    Ok(Json(state.monitor.stats(kind).await?))
}

/// GET /backend - which backend is active.
pub async fn backend(State(state): State<AppState>) -> Json<BackendResponse> {
    Json(BackendResponse {
        backend: state.selector.current_kind().await,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// POST /backend/switch?db=<name> - replace the active backend.
pub async fn switch_backend(
    State(state): State<AppState>,
    Query(params): Query<DbParams>,
) -> Result<Json<BackendResponse>, ApiError> {
    let name = params
        .db
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Parameter 'db' is required".to_string()))?;

    let kind = state.selector.switch(name).await?;
    info!(backend = %kind, "Active backend switched via API");
    Ok(Json(BackendResponse {
        backend: kind,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}
