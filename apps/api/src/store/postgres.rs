use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rule::{Rule, RuleVersion, TargetSection};
use crate::store::{RuleStore, VersionStore};

const RULE_COLUMNS: &str = "id, name, description, category, target_section, pattern, \
     suggestion, priority, is_active, created_at, updated_at";

const VERSION_COLUMNS: &str = "id, rule_id, rule_name, version, pattern, suggestion, \
     description, category, priority, target_section, is_active, change_reason, changed_by, \
     status, created_at, effective_at, expires_at";

#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    description: String,
    category: String,
    target_section: String,
    pattern: String,
    suggestion: String,
    priority: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for Rule {
    type Error = AppError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        Ok(Rule {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            target_section: parse_section(&row.target_section)?,
            pattern: row.pattern,
            suggestion: row.suggestion,
            priority: row.priority,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RuleVersionRow {
    id: Uuid,
    rule_id: Uuid,
    rule_name: String,
    version: i32,
    pattern: String,
    suggestion: String,
    description: String,
    category: String,
    priority: i32,
    target_section: String,
    is_active: bool,
    change_reason: String,
    changed_by: String,
    status: String,
    created_at: DateTime<Utc>,
    effective_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<RuleVersionRow> for RuleVersion {
    type Error = AppError;

    fn try_from(row: RuleVersionRow) -> Result<Self, Self::Error> {
        Ok(RuleVersion {
            id: row.id,
            rule_id: row.rule_id,
            rule_name: row.rule_name,
            version: row.version,
            pattern: row.pattern,
            suggestion: row.suggestion,
            description: row.description,
            category: row.category,
            priority: row.priority,
            target_section: parse_section(&row.target_section)?,
            is_active: row.is_active,
            change_reason: row.change_reason,
            changed_by: row.changed_by,
            status: row
                .status
                .parse()
                .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?,
            created_at: row.created_at,
            effective_at: row.effective_at,
            expires_at: row.expires_at,
        })
    }
}

fn parse_section(raw: &str) -> Result<TargetSection, AppError> {
    raw.parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!("Corrupt rule row: {e}")))
}

fn into_rules(rows: Vec<RuleRow>) -> Result<Vec<Rule>, AppError> {
    rows.into_iter().map(Rule::try_from).collect()
}

/// Escapes LIKE metacharacters so user keywords match literally.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Postgres-backed rule catalog and version history.
/// `rules.seq` is a BIGSERIAL used only as the insertion-order tie-breaker.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleStore for PgStore {
    async fn insert_rule(&self, rule: &Rule) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO rules
                (id, name, description, category, target_section, pattern,
                 suggestion, priority, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(&rule.category)
        .bind(rule.target_section.as_str())
        .bind(&rule.pattern)
        .bind(&rule.suggestion)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_rule(&self, rule: &Rule) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE rules
            SET name = $2, description = $3, category = $4, target_section = $5,
                pattern = $6, suggestion = $7, priority = $8, is_active = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(&rule.category)
        .bind(rule.target_section.as_str())
        .bind(&rule.pattern)
        .bind(&rule.suggestion)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Rule {} not found", rule.id)));
        }
        Ok(())
    }

    async fn delete_rule(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_rule(&self, id: Uuid) -> Result<Option<Rule>, AppError> {
        let row: Option<RuleRow> =
            sqlx::query_as(&format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Rule::try_from).transpose()
    }

    async fn list_rules(&self) -> Result<Vec<Rule>, AppError> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules ORDER BY priority DESC, seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn list_rules_page(&self, offset: i64, limit: i64) -> Result<Vec<Rule>, AppError> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules ORDER BY priority DESC, seq ASC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn active_rules_for_section(
        &self,
        section: TargetSection,
    ) -> Result<Vec<Rule>, AppError> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules \
             WHERE is_active AND target_section = $1 \
             ORDER BY priority DESC, seq ASC"
        ))
        .bind(section.as_str())
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn active_rules(&self) -> Result<Vec<Rule>, AppError> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE is_active ORDER BY priority DESC, seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn active_rules_by_category(&self, category: &str) -> Result<Vec<Rule>, AppError> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules \
             WHERE is_active AND category = $1 \
             ORDER BY priority DESC, seq ASC"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn search_rules(&self, keyword: &str) -> Result<Vec<Rule>, AppError> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE name ILIKE $1 \
             ORDER BY priority DESC, seq ASC"
        ))
        .bind(like_pattern(keyword))
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn count_rules(&self) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM rules")
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl VersionStore for PgStore {
    async fn insert_version(&self, version: &RuleVersion) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO rule_versions
                (id, rule_id, rule_name, version, pattern, suggestion, description,
                 category, priority, target_section, is_active, change_reason,
                 changed_by, status, created_at, effective_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(version.id)
        .bind(version.rule_id)
        .bind(&version.rule_name)
        .bind(version.version)
        .bind(&version.pattern)
        .bind(&version.suggestion)
        .bind(&version.description)
        .bind(&version.category)
        .bind(version.priority)
        .bind(version.target_section.as_str())
        .bind(version.is_active)
        .bind(&version.change_reason)
        .bind(&version.changed_by)
        .bind(version.status.as_str())
        .bind(version.created_at)
        .bind(version.effective_at)
        .bind(version.expires_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // (rule_id, version) is unique; a clash means two writers raced on one rule.
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(AppError::ConsistencyViolation(format!(
                    "Rule {} already has version {}",
                    version.rule_id, version.version
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn max_version(&self, rule_id: Uuid) -> Result<Option<i32>, AppError> {
        Ok(
            sqlx::query_scalar("SELECT MAX(version) FROM rule_versions WHERE rule_id = $1")
                .bind(rule_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn expire_version(
        &self,
        rule_id: Uuid,
        version: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE rule_versions SET expires_at = $3, status = 'EXPIRED' \
             WHERE rule_id = $1 AND version = $2",
        )
        .bind(rule_id)
        .bind(version)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn versions_desc(&self, rule_id: Uuid) -> Result<Vec<RuleVersion>, AppError> {
        let rows: Vec<RuleVersionRow> = sqlx::query_as(&format!(
            "SELECT {VERSION_COLUMNS} FROM rule_versions WHERE rule_id = $1 ORDER BY version DESC"
        ))
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RuleVersion::try_from).collect()
    }

    async fn get_version(
        &self,
        rule_id: Uuid,
        version: i32,
    ) -> Result<Option<RuleVersion>, AppError> {
        let row: Option<RuleVersionRow> = sqlx::query_as(&format!(
            "SELECT {VERSION_COLUMNS} FROM rule_versions WHERE rule_id = $1 AND version = $2"
        ))
        .bind(rule_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RuleVersion::try_from).transpose()
    }

    async fn delete_versions(&self, rule_id: Uuid, versions: &[i32]) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM rule_versions WHERE rule_id = $1 AND version = ANY($2)")
                .bind(rule_id)
                .bind(versions)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn versioned_rule_ids(&self) -> Result<Vec<Uuid>, AppError> {
        Ok(
            sqlx::query_scalar("SELECT DISTINCT rule_id FROM rule_versions")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    #[test]
    fn test_corrupt_section_is_internal_error() {
        let err = parse_section("HOBBIES").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
