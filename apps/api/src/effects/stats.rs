//! Running per-rule effect statistics and the append-only feedback log.
//!
//! Counters are independent: readers may see a usage count and a score sum that are
//! one evaluation apart. Nothing derived from them needs a consistent snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::effects::{FeedbackType, RuleEffectStats, UserFeedback};
use crate::errors::AppError;

#[async_trait]
pub trait EffectStatsStore: Send + Sync {
    /// Adds one evaluation: usage +1 and the scaled score and length delta to the sums.
    async fn record_evaluation(
        &self,
        rule_id: Uuid,
        scaled_score: i64,
        scaled_length_change: i64,
    ) -> Result<(), AppError>;

    /// Appends feedback and bumps the positive or negative counter. Neutral is logged only.
    async fn record_feedback(&self, feedback: &UserFeedback) -> Result<(), AppError>;

    /// `None` when nothing has been recorded for the rule.
    async fn stats(&self, rule_id: Uuid) -> Result<Option<RuleEffectStats>, AppError>;

    async fn feedback(&self, rule_id: Uuid) -> Result<Vec<UserFeedback>, AppError>;

    /// Every rule with at least one evaluation or feedback entry.
    async fn rules_with_stats(&self) -> Result<Vec<Uuid>, AppError>;
}

// ── In-process backend ──────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    usage: AtomicI64,
    positive: AtomicI64,
    negative: AtomicI64,
    score_sum: AtomicI64,
    length_change_sum: AtomicI64,
}

impl Counters {
    fn snapshot(&self) -> RuleEffectStats {
        RuleEffectStats::from_counters(
            self.usage.load(Ordering::Relaxed),
            self.positive.load(Ordering::Relaxed),
            self.negative.load(Ordering::Relaxed),
            self.score_sum.load(Ordering::Relaxed),
            self.length_change_sum.load(Ordering::Relaxed),
        )
    }
}

/// Resets on restart. Used when no Redis URL is configured.
#[derive(Default)]
pub struct MemoryEffectStats {
    counters: RwLock<HashMap<Uuid, Arc<Counters>>>,
    feedback: RwLock<HashMap<Uuid, Vec<UserFeedback>>>,
}

impl MemoryEffectStats {
    pub fn new() -> Self {
        Self::default()
    }

    async fn counters_for(&self, rule_id: Uuid) -> Arc<Counters> {
        if let Some(c) = self.counters.read().await.get(&rule_id) {
            return c.clone();
        }
        self.counters
            .write()
            .await
            .entry(rule_id)
            .or_default()
            .clone()
    }
}

#[async_trait]
impl EffectStatsStore for MemoryEffectStats {
    async fn record_evaluation(
        &self,
        rule_id: Uuid,
        scaled_score: i64,
        scaled_length_change: i64,
    ) -> Result<(), AppError> {
        let c = self.counters_for(rule_id).await;
        c.usage.fetch_add(1, Ordering::Relaxed);
        c.score_sum.fetch_add(scaled_score, Ordering::Relaxed);
        c.length_change_sum
            .fetch_add(scaled_length_change, Ordering::Relaxed);
        Ok(())
    }

    async fn record_feedback(&self, feedback: &UserFeedback) -> Result<(), AppError> {
        self.feedback
            .write()
            .await
            .entry(feedback.rule_id)
            .or_default()
            .push(feedback.clone());

        let c = self.counters_for(feedback.rule_id).await;
        match feedback.feedback_type {
            FeedbackType::Positive => {
                c.positive.fetch_add(1, Ordering::Relaxed);
            }
            FeedbackType::Negative => {
                c.negative.fetch_add(1, Ordering::Relaxed);
            }
            FeedbackType::Neutral => {}
        }
        Ok(())
    }

    async fn stats(&self, rule_id: Uuid) -> Result<Option<RuleEffectStats>, AppError> {
        Ok(self
            .counters
            .read()
            .await
            .get(&rule_id)
            .map(|c| c.snapshot()))
    }

    async fn feedback(&self, rule_id: Uuid) -> Result<Vec<UserFeedback>, AppError> {
        Ok(self
            .feedback
            .read()
            .await
            .get(&rule_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn rules_with_stats(&self) -> Result<Vec<Uuid>, AppError> {
        Ok(self.counters.read().await.keys().copied().collect())
    }
}

// ── Redis backend ───────────────────────────────────────────────────────────

const KEY_PREFIX: &str = "rule_effect:v1";
const FIELD_USAGE: &str = "usage_count";
const FIELD_POSITIVE: &str = "positive_feedback_count";
const FIELD_NEGATIVE: &str = "negative_feedback_count";
const FIELD_SCORE: &str = "total_score_scaled";
const FIELD_LENGTH_CHANGE: &str = "total_content_change_scaled";

fn stats_key(rule_id: Uuid) -> String {
    format!("{KEY_PREFIX}:stats:{rule_id}")
}

fn feedback_key(rule_id: Uuid) -> String {
    format!("{KEY_PREFIX}:feedback:{rule_id}")
}

fn rules_key() -> String {
    format!("{KEY_PREFIX}:rules")
}

/// Durable counters: one HINCRBY hash per rule, an RPUSH feedback log, and a set of
/// rule ids for ranking.
pub struct RedisEffectStats {
    client: redis::Client,
}

impl RedisEffectStats {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl EffectStatsStore for RedisEffectStats {
    async fn record_evaluation(
        &self,
        rule_id: Uuid,
        scaled_score: i64,
        scaled_length_change: i64,
    ) -> Result<(), AppError> {
        let key = stats_key(rule_id);
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .hincr(&key, FIELD_USAGE, 1)
            .ignore()
            .hincr(&key, FIELD_SCORE, scaled_score)
            .ignore()
            .hincr(&key, FIELD_LENGTH_CHANGE, scaled_length_change)
            .ignore()
            .sadd(rules_key(), rule_id.to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn record_feedback(&self, feedback: &UserFeedback) -> Result<(), AppError> {
        let entry = serde_json::to_string(feedback)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize feedback: {e}")))?;
        let key = stats_key(feedback.rule_id);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(feedback_key(feedback.rule_id), entry)
            .ignore()
            .sadd(rules_key(), feedback.rule_id.to_string())
            .ignore();
        match feedback.feedback_type {
            FeedbackType::Positive => {
                pipe.hincr(&key, FIELD_POSITIVE, 1).ignore();
            }
            FeedbackType::Negative => {
                pipe.hincr(&key, FIELD_NEGATIVE, 1).ignore();
            }
            FeedbackType::Neutral => {}
        }

        let mut conn = self.conn().await?;
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn stats(&self, rule_id: Uuid) -> Result<Option<RuleEffectStats>, AppError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, i64> = conn.hgetall(stats_key(rule_id)).await?;
        if fields.is_empty() {
            let known: bool = conn.sismember(rules_key(), rule_id.to_string()).await?;
            if !known {
                return Ok(None);
            }
        }
        let get = |field: &str| fields.get(field).copied().unwrap_or(0);
        Ok(Some(RuleEffectStats::from_counters(
            get(FIELD_USAGE),
            get(FIELD_POSITIVE),
            get(FIELD_NEGATIVE),
            get(FIELD_SCORE),
            get(FIELD_LENGTH_CHANGE),
        )))
    }

    async fn feedback(&self, rule_id: Uuid) -> Result<Vec<UserFeedback>, AppError> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn.lrange(feedback_key(rule_id), 0, -1).await?;
        Ok(raw
            .iter()
            .filter_map(|entry| {
                serde_json::from_str(entry)
                    .inspect_err(|e| warn!(%rule_id, error = %e, "Skipping unreadable feedback entry"))
                    .ok()
            })
            .collect())
    }

    async fn rules_with_stats(&self) -> Result<Vec<Uuid>, AppError> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn.smembers(rules_key()).await?;
        Ok(members
            .iter()
            .filter_map(|m| Uuid::parse_str(m).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn feedback(rule_id: Uuid, feedback_type: FeedbackType) -> UserFeedback {
        UserFeedback {
            rule_id,
            feedback_type,
            comment: String::new(),
            user_id: "u1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_stats_accumulate() {
        let stats = MemoryEffectStats::new();
        let id = Uuid::new_v4();
        stats.record_evaluation(id, 800, 1000).await.unwrap();
        stats.record_evaluation(id, 600, -500).await.unwrap();

        let s = stats.stats(id).await.unwrap().unwrap();
        assert_eq!(s.usage_count, 2);
        assert_eq!(s.average_score, 7.0);
        assert_eq!(s.average_content_change, 2.5);
    }

    #[tokio::test]
    async fn test_neutral_feedback_is_logged_but_not_counted() {
        let stats = MemoryEffectStats::new();
        let id = Uuid::new_v4();
        stats.record_feedback(&feedback(id, FeedbackType::Positive)).await.unwrap();
        stats.record_feedback(&feedback(id, FeedbackType::Neutral)).await.unwrap();
        stats.record_feedback(&feedback(id, FeedbackType::Negative)).await.unwrap();

        let s = stats.stats(id).await.unwrap().unwrap();
        assert_eq!(s.positive_feedback_count, 1);
        assert_eq!(s.negative_feedback_count, 1);
        assert_eq!(s.usage_count, 0);
        assert_eq!(stats.feedback(id).await.unwrap().len(), 3);
        assert_eq!(stats.rules_with_stats().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_unknown_rule_has_no_stats() {
        let stats = MemoryEffectStats::new();
        assert!(stats.stats(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_evaluations_lose_no_increments() {
        let stats = Arc::new(MemoryEffectStats::new());
        let id = Uuid::new_v4();
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let stats = stats.clone();
                tokio::spawn(async move { stats.record_evaluation(id, 700, 0).await.unwrap() })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        let s = stats.stats(id).await.unwrap().unwrap();
        assert_eq!(s.usage_count, 50);
        assert_eq!(s.total_score_scaled, 35_000);
    }

    #[test]
    fn test_redis_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            stats_key(id),
            "rule_effect:v1:stats:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            feedback_key(id),
            "rule_effect:v1:feedback:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(rules_key(), "rule_effect:v1:rules");
    }
}
