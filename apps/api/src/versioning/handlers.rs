use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rule::{Rule, RuleVersion};
use crate::state::AppState;
use crate::versioning::{VersionComparison, VersionStatistics, DEFAULT_ACTOR};

#[derive(Deserialize)]
pub struct CompareQuery {
    pub v1: i32,
    pub v2: i32,
}

#[derive(Deserialize, Default)]
pub struct RestoreRequest {
    pub restored_by: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CleanupRequest {
    pub keep_versions: Option<usize>,
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub keep_versions: usize,
    pub deleted: u64,
}

/// GET /api/v1/rules/:id/versions
pub async fn handle_version_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RuleVersion>>, AppError> {
    Ok(Json(state.versions.get_version_history(id).await?))
}

/// GET /api/v1/rules/:id/versions/:v
pub async fn handle_get_version(
    State(state): State<AppState>,
    Path((id, v)): Path<(Uuid, i32)>,
) -> Result<Json<RuleVersion>, AppError> {
    Ok(Json(state.versions.get_version(id, v).await?))
}

/// POST /api/v1/rules/:id/versions/:v/restore
pub async fn handle_restore_version(
    State(state): State<AppState>,
    Path((id, v)): Path<(Uuid, i32)>,
    body: Option<Json<RestoreRequest>>,
) -> Result<Json<Rule>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let actor = req.restored_by.as_deref().unwrap_or(DEFAULT_ACTOR);
    Ok(Json(state.versions.restore_to_version(id, v, actor).await?))
}

/// GET /api/v1/rules/:id/versions/compare?v1=&v2=
pub async fn handle_compare_versions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<CompareQuery>,
) -> Result<Json<VersionComparison>, AppError> {
    Ok(Json(state.versions.compare_versions(id, q.v1, q.v2).await?))
}

/// GET /api/v1/rules/:id/versions/statistics
pub async fn handle_version_statistics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VersionStatistics>, AppError> {
    Ok(Json(state.versions.get_version_statistics(id).await?))
}

/// POST /api/v1/rule-versions/cleanup
/// Operator endpoint. Falls back to the configured retention when `keep_versions` is omitted.
pub async fn handle_cleanup_versions(
    State(state): State<AppState>,
    body: Option<Json<CleanupRequest>>,
) -> Result<Json<CleanupResponse>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let keep_versions = req.keep_versions.unwrap_or(state.config.version_retention);
    let deleted = state.versions.cleanup_expired_versions(keep_versions).await?;
    Ok(Json(CleanupResponse {
        keep_versions,
        deleted,
    }))
}
