use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rule::{Rule, RuleVersion, TargetSection, VersionStatus};
use crate::store::{RuleStore, VersionStore};

/// In-process store. Rules are kept in insertion order so a stable priority sort
/// reproduces the Postgres `ORDER BY priority DESC, seq ASC` contract.
#[derive(Default)]
pub struct MemoryStore {
    rules: RwLock<Vec<Rule>>,
    versions: RwLock<Vec<RuleVersion>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_priority(mut rules: Vec<Rule>) -> Vec<Rule> {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn insert_rule(&self, rule: &Rule) -> Result<(), AppError> {
        let mut rules = self.rules.write().await;
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(AppError::Validation(format!("Rule {} already exists", rule.id)));
        }
        rules.push(rule.clone());
        Ok(())
    }

    async fn update_rule(&self, rule: &Rule) -> Result<(), AppError> {
        let mut rules = self.rules.write().await;
        let slot = rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| AppError::NotFound(format!("Rule {} not found", rule.id)))?;
        *slot = rule.clone();
        Ok(())
    }

    async fn delete_rule(&self, id: Uuid) -> Result<bool, AppError> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        Ok(rules.len() != before)
    }

    async fn get_rule(&self, id: Uuid) -> Result<Option<Rule>, AppError> {
        Ok(self.rules.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list_rules(&self) -> Result<Vec<Rule>, AppError> {
        Ok(by_priority(self.rules.read().await.clone()))
    }

    async fn list_rules_page(&self, offset: i64, limit: i64) -> Result<Vec<Rule>, AppError> {
        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .list_rules()
            .await?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn active_rules_for_section(
        &self,
        section: TargetSection,
    ) -> Result<Vec<Rule>, AppError> {
        let rules = self.rules.read().await;
        Ok(by_priority(
            rules
                .iter()
                .filter(|r| r.is_active && r.target_section == section)
                .cloned()
                .collect(),
        ))
    }

    async fn active_rules(&self) -> Result<Vec<Rule>, AppError> {
        let rules = self.rules.read().await;
        Ok(by_priority(
            rules.iter().filter(|r| r.is_active).cloned().collect(),
        ))
    }

    async fn active_rules_by_category(&self, category: &str) -> Result<Vec<Rule>, AppError> {
        let rules = self.rules.read().await;
        Ok(by_priority(
            rules
                .iter()
                .filter(|r| r.is_active && r.category == category)
                .cloned()
                .collect(),
        ))
    }

    async fn search_rules(&self, keyword: &str) -> Result<Vec<Rule>, AppError> {
        let needle = keyword.to_lowercase();
        let rules = self.rules.read().await;
        Ok(by_priority(
            rules
                .iter()
                .filter(|r| r.name.to_lowercase().contains(&needle))
                .cloned()
                .collect(),
        ))
    }

    async fn count_rules(&self) -> Result<i64, AppError> {
        Ok(self.rules.read().await.len() as i64)
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn insert_version(&self, version: &RuleVersion) -> Result<(), AppError> {
        let mut versions = self.versions.write().await;
        if versions
            .iter()
            .any(|v| v.rule_id == version.rule_id && v.version == version.version)
        {
            return Err(AppError::ConsistencyViolation(format!(
                "Rule {} already has version {}",
                version.rule_id, version.version
            )));
        }
        versions.push(version.clone());
        Ok(())
    }

    async fn max_version(&self, rule_id: Uuid) -> Result<Option<i32>, AppError> {
        Ok(self
            .versions
            .read()
            .await
            .iter()
            .filter(|v| v.rule_id == rule_id)
            .map(|v| v.version)
            .max())
    }

    async fn expire_version(
        &self,
        rule_id: Uuid,
        version: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut versions = self.versions.write().await;
        if let Some(v) = versions
            .iter_mut()
            .find(|v| v.rule_id == rule_id && v.version == version)
        {
            v.expires_at = Some(expires_at);
            v.status = VersionStatus::Expired;
        }
        Ok(())
    }

    async fn versions_desc(&self, rule_id: Uuid) -> Result<Vec<RuleVersion>, AppError> {
        let mut found: Vec<RuleVersion> = self
            .versions
            .read()
            .await
            .iter()
            .filter(|v| v.rule_id == rule_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(found)
    }

    async fn get_version(
        &self,
        rule_id: Uuid,
        version: i32,
    ) -> Result<Option<RuleVersion>, AppError> {
        Ok(self
            .versions
            .read()
            .await
            .iter()
            .find(|v| v.rule_id == rule_id && v.version == version)
            .cloned())
    }

    async fn delete_versions(&self, rule_id: Uuid, versions: &[i32]) -> Result<u64, AppError> {
        let mut stored = self.versions.write().await;
        let before = stored.len();
        stored.retain(|v| !(v.rule_id == rule_id && versions.contains(&v.version)));
        Ok((before - stored.len()) as u64)
    }

    async fn versioned_rule_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let mut ids: Vec<Uuid> = Vec::new();
        for v in self.versions.read().await.iter() {
            if !ids.contains(&v.rule_id) {
                ids.push(v.rule_id);
            }
        }
        Ok(ids)
    }
}
