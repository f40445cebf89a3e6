use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::effects::{FeedbackInput, RuleEffectEvaluation, RuleEffectReport, RuleRanking, UserFeedback};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct EvaluationRequest {
    pub original_content: String,
    pub optimized_content: String,
}

/// POST /api/v1/rules/:id/evaluations
pub async fn handle_evaluate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EvaluationRequest>,
) -> Result<Json<RuleEffectEvaluation>, AppError> {
    let evaluation = state
        .effects
        .evaluate_rule_effect(id, &req.original_content, &req.optimized_content)
        .await?;
    Ok(Json(evaluation))
}

/// POST /api/v1/rules/:id/feedback
pub async fn handle_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<FeedbackInput>,
) -> Result<(StatusCode, Json<UserFeedback>), AppError> {
    let feedback = state.effects.record_user_feedback(id, input).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

/// GET /api/v1/rules/:id/effect
pub async fn handle_effect_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RuleEffectReport>, AppError> {
    Ok(Json(state.effects.get_rule_effect_report(id).await?))
}

/// GET /api/v1/rule-effects/rankings
pub async fn handle_rankings(
    State(state): State<AppState>,
) -> Result<Json<Vec<RuleRanking>>, AppError> {
    Ok(Json(state.effects.get_rule_rankings().await?))
}
