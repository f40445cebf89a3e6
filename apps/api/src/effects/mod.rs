//! Rule Effect Evaluation: before/after metrics, AI assessment, user feedback and rankings.
//!
//! Reports are cached per rule and invalidated whenever an evaluation or feedback entry
//! for that rule is recorded.

pub mod handlers;
pub mod metrics;
pub mod prompts;
pub mod stats;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::errors::AppError;
use crate::llm_client::{improve_with_timeout, TextImprover};
use crate::models::rule::Rule;
use crate::store::Store;

use self::stats::EffectStatsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackType {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackType::Positive => write!(f, "POSITIVE"),
            FeedbackType::Negative => write!(f, "NEGATIVE"),
            FeedbackType::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Append-only; never edited or retracted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserFeedback {
    pub rule_id: Uuid,
    pub feedback_type: FeedbackType,
    pub comment: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time view of a rule's running counters, with averages derived on read.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct RuleEffectStats {
    pub usage_count: i64,
    pub positive_feedback_count: i64,
    pub negative_feedback_count: i64,
    pub total_score_scaled: i64,
    pub total_content_change_scaled: i64,
    pub average_score: f64,
    pub average_content_change: f64,
}

impl RuleEffectStats {
    pub fn from_counters(
        usage_count: i64,
        positive_feedback_count: i64,
        negative_feedback_count: i64,
        total_score_scaled: i64,
        total_content_change_scaled: i64,
    ) -> Self {
        Self {
            usage_count,
            positive_feedback_count,
            negative_feedback_count,
            total_score_scaled,
            total_content_change_scaled,
            average_score: metrics::unscale(total_score_scaled, usage_count),
            average_content_change: metrics::unscale(total_content_change_scaled, usage_count),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedbackStats {
    pub total_count: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    /// positive / (positive + negative). Neutral feedback does not move it.
    pub positive_rate: f64,
}

impl FeedbackStats {
    pub fn from_feedback(feedback: &[UserFeedback]) -> Self {
        let count = |t: FeedbackType| feedback.iter().filter(|f| f.feedback_type == t).count();
        let positive_count = count(FeedbackType::Positive);
        let negative_count = count(FeedbackType::Negative);
        let rated = positive_count + negative_count;
        Self {
            total_count: feedback.len(),
            positive_count,
            negative_count,
            neutral_count: count(FeedbackType::Neutral),
            positive_rate: if rated == 0 {
                0.0
            } else {
                positive_count as f64 / rated as f64
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleEffectEvaluation {
    pub rule_id: Uuid,
    pub content_length_change: f64,
    pub keyword_improvement: i64,
    pub readability_score: f64,
    pub ai_assessment: String,
    pub ai_score: f64,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleEffectReport {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub rule_category: String,
    pub effect_stats: RuleEffectStats,
    pub feedback_stats: FeedbackStats,
    pub overall_score: f64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleRanking {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub overall_score: f64,
    pub usage_count: i64,
    pub positive_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackInput {
    pub feedback_type: FeedbackType,
    #[serde(default)]
    pub comment: String,
    pub user_id: String,
}

pub struct EffectEvaluator {
    store: Arc<dyn Store>,
    stats: Arc<dyn EffectStatsStore>,
    improver: Arc<dyn TextImprover>,
    ai_timeout: Duration,
    reports: TtlCache<Uuid, RuleEffectReport>,
}

impl EffectEvaluator {
    pub fn new(
        store: Arc<dyn Store>,
        stats: Arc<dyn EffectStatsStore>,
        improver: Arc<dyn TextImprover>,
        ai_timeout: Duration,
        report_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            store,
            stats,
            improver,
            ai_timeout,
            reports: TtlCache::new("effect_reports", report_ttl, cache_capacity),
        }
    }

    async fn require_rule(&self, rule_id: Uuid) -> Result<Rule, AppError> {
        self.store
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Rule {rule_id} not found")))
    }

    /// Scores one before/after pair and folds it into the rule's running stats.
    pub async fn evaluate_rule_effect(
        &self,
        rule_id: Uuid,
        original: &str,
        optimized: &str,
    ) -> Result<RuleEffectEvaluation, AppError> {
        self.require_rule(rule_id).await?;

        let content_length_change = metrics::content_length_change(original, optimized);
        let keyword_improvement = metrics::keyword_improvement(original, optimized);
        let readability_score = metrics::readability_score(optimized);

        let prompt = prompts::assessment_prompt(original, optimized);
        let (ai_assessment, ai_score) = match improve_with_timeout(
            self.improver.as_ref(),
            &prompt,
            prompts::ASSESSMENT_FOCUS,
            self.ai_timeout,
        )
        .await
        {
            Ok(text) => {
                let score = metrics::extract_ai_score(&text);
                (text, score)
            }
            Err(e) => {
                warn!(%rule_id, error = %e, "AI assessment failed, using default score");
                (
                    prompts::ASSESSMENT_UNAVAILABLE.to_string(),
                    metrics::DEFAULT_AI_SCORE,
                )
            }
        };

        self.stats
            .record_evaluation(
                rule_id,
                metrics::scale(ai_score),
                metrics::scale(content_length_change),
            )
            .await?;
        self.reports.invalidate(&rule_id).await;

        info!(%rule_id, ai_score, "Rule effect evaluated");
        Ok(RuleEffectEvaluation {
            rule_id,
            content_length_change,
            keyword_improvement,
            readability_score,
            ai_assessment,
            ai_score,
            evaluated_at: Utc::now(),
        })
    }

    pub async fn record_user_feedback(
        &self,
        rule_id: Uuid,
        input: FeedbackInput,
    ) -> Result<UserFeedback, AppError> {
        self.require_rule(rule_id).await?;
        if input.user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id must not be empty".to_string()));
        }

        let feedback = UserFeedback {
            rule_id,
            feedback_type: input.feedback_type,
            comment: input.comment,
            user_id: input.user_id,
            created_at: Utc::now(),
        };
        self.stats.record_feedback(&feedback).await?;
        self.reports.invalidate(&rule_id).await;

        info!(%rule_id, feedback_type = %feedback.feedback_type, "User feedback recorded");
        Ok(feedback)
    }

    pub async fn get_rule_effect_report(&self, rule_id: Uuid) -> Result<RuleEffectReport, AppError> {
        if let Some(report) = self.reports.get(&rule_id).await {
            return Ok(report);
        }

        let loaded_at = self.reports.generation().await;
        let rule = self.require_rule(rule_id).await?;
        let effect_stats = self.stats.stats(rule_id).await?.unwrap_or_default();
        let feedback_stats = FeedbackStats::from_feedback(&self.stats.feedback(rule_id).await?);
        let overall_score = metrics::overall_score(
            effect_stats.average_score,
            feedback_stats.positive_rate,
            effect_stats.usage_count,
        );

        let report = RuleEffectReport {
            rule_id,
            rule_name: rule.name,
            rule_category: rule.category,
            effect_stats,
            feedback_stats,
            overall_score,
            generated_at: Utc::now(),
        };
        self.reports.insert(rule_id, report.clone(), loaded_at).await;
        Ok(report)
    }

    /// Every rule with recorded stats, best overall score first. A rule whose report
    /// cannot be built (for example, deleted since) is logged and left out.
    pub async fn get_rule_rankings(&self) -> Result<Vec<RuleRanking>, AppError> {
        let mut rankings = Vec::new();
        for rule_id in self.stats.rules_with_stats().await? {
            match self.get_rule_effect_report(rule_id).await {
                Ok(report) => rankings.push(RuleRanking {
                    rule_id,
                    rule_name: report.rule_name,
                    overall_score: report.overall_score,
                    usage_count: report.effect_stats.usage_count,
                    positive_rate: report.feedback_stats.positive_rate,
                }),
                Err(e) => warn!(%rule_id, error = %e, "Skipping rule in rankings"),
            }
        }

        rankings.sort_by(|a, b| b.overall_score.total_cmp(&a.overall_score));
        Ok(rankings)
    }
}
