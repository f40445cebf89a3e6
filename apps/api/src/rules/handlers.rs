use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rule::{Rule, RuleInput, TargetSection};
use crate::rules::{
    BatchResult, OptimizationResult, RuleCatalogStatistics, RulePage, DEFAULT_PAGE_SIZE,
    UPDATE_REASON_DEFAULT,
};
use crate::state::AppState;
use crate::versioning::DEFAULT_ACTOR;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Deserialize)]
pub struct ApplyRequest {
    pub content: String,
    pub target_section: Option<TargetSection>,
}

#[derive(Deserialize)]
pub struct BatchApplyRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(flatten)]
    pub rule: RuleInput,
    pub change_reason: Option<String>,
    pub changed_by: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusToggle {
    pub is_active: bool,
}

/// GET /api/v1/rules
pub async fn handle_list_rules(State(state): State<AppState>) -> Result<Json<Vec<Rule>>, AppError> {
    Ok(Json(state.rules.list_rules().await?))
}

/// GET /api/v1/rules/page?page=&size=
pub async fn handle_rules_page(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Result<Json<RulePage>, AppError> {
    let page = state
        .rules
        .list_rules_page(
            params.page.unwrap_or(0),
            params.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page))
}

/// POST /api/v1/rules
pub async fn handle_create_rule(
    State(state): State<AppState>,
    Json(input): Json<RuleInput>,
) -> Result<(StatusCode, Json<Rule>), AppError> {
    let rule = state.rules.create_rule(input).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /api/v1/rules/active
pub async fn handle_active_rules(
    State(state): State<AppState>,
) -> Result<Json<Vec<Rule>>, AppError> {
    Ok(Json(state.rules.list_active_rules().await?))
}

/// GET /api/v1/rules/categories
pub async fn handle_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.rules.categories().await?))
}

/// GET /api/v1/rules/category/:category
pub async fn handle_rules_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<Rule>>, AppError> {
    Ok(Json(state.rules.rules_by_category(&category).await?))
}

/// GET /api/v1/rules/search?q=
pub async fn handle_search_rules(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<Rule>>, AppError> {
    Ok(Json(state.rules.search_rules(&params.q).await?))
}

/// GET /api/v1/rules/statistics
pub async fn handle_catalog_statistics(
    State(state): State<AppState>,
) -> Result<Json<RuleCatalogStatistics>, AppError> {
    Ok(Json(state.rules.catalog_statistics().await?))
}

/// POST /api/v1/rules/apply
pub async fn handle_apply_rules(
    State(state): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<Vec<OptimizationResult>>, AppError> {
    let results = state
        .rules
        .apply_all_rules(&req.content, req.target_section)
        .await?;
    Ok(Json(results))
}

/// POST /api/v1/rules/batch-apply
pub async fn handle_batch_apply(
    State(state): State<AppState>,
    Json(req): Json<BatchApplyRequest>,
) -> Result<Json<BatchResult>, AppError> {
    Ok(Json(state.rules.batch_apply_rules(&req.content).await?))
}

/// GET /api/v1/rules/:id
pub async fn handle_get_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rule>, AppError> {
    Ok(Json(state.rules.get_rule(id).await?))
}

/// PUT /api/v1/rules/:id
pub async fn handle_update_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<Json<Rule>, AppError> {
    let reason = req.change_reason.as_deref().unwrap_or(UPDATE_REASON_DEFAULT);
    let actor = req.changed_by.as_deref().unwrap_or(DEFAULT_ACTOR);
    let rule = state.rules.update_rule(id, req.rule, reason, actor).await?;
    Ok(Json(rule))
}

/// DELETE /api/v1/rules/:id
pub async fn handle_delete_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.rules.delete_rule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/v1/rules/:id/status
pub async fn handle_toggle_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusToggle>,
) -> Result<Json<Rule>, AppError> {
    Ok(Json(state.rules.toggle_rule_status(id, req.is_active).await?))
}
