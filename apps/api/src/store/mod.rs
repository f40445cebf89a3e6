//! Persistence seam for rules and their version history.
//!
//! `PgStore` is the production backend. `MemoryStore` backs tests and the
//! database-less dev mode. Both keep the same ordering contract: rule listings
//! are priority descending with insertion order breaking ties, and version
//! listings are version descending.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rule::{Rule, RuleVersion, TargetSection};

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn insert_rule(&self, rule: &Rule) -> Result<(), AppError>;

    /// Persists every mutable field of an existing rule. `NotFound` if the id is unknown.
    async fn update_rule(&self, rule: &Rule) -> Result<(), AppError>;

    /// Returns `true` if a rule was removed.
    async fn delete_rule(&self, id: Uuid) -> Result<bool, AppError>;

    async fn get_rule(&self, id: Uuid) -> Result<Option<Rule>, AppError>;

    async fn list_rules(&self) -> Result<Vec<Rule>, AppError>;

    /// One window of `list_rules` ordering.
    async fn list_rules_page(&self, offset: i64, limit: i64) -> Result<Vec<Rule>, AppError>;

    /// Active rules whose target section equals `section` exactly.
    async fn active_rules_for_section(
        &self,
        section: TargetSection,
    ) -> Result<Vec<Rule>, AppError>;

    async fn active_rules(&self) -> Result<Vec<Rule>, AppError>;

    async fn active_rules_by_category(&self, category: &str) -> Result<Vec<Rule>, AppError>;

    /// Case-insensitive substring match on the rule name.
    async fn search_rules(&self, keyword: &str) -> Result<Vec<Rule>, AppError>;

    async fn count_rules(&self) -> Result<i64, AppError>;
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn insert_version(&self, version: &RuleVersion) -> Result<(), AppError>;

    /// Highest stored version number for the rule, read from the backing store.
    async fn max_version(&self, rule_id: Uuid) -> Result<Option<i32>, AppError>;

    async fn expire_version(
        &self,
        rule_id: Uuid,
        version: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn versions_desc(&self, rule_id: Uuid) -> Result<Vec<RuleVersion>, AppError>;

    async fn get_version(
        &self,
        rule_id: Uuid,
        version: i32,
    ) -> Result<Option<RuleVersion>, AppError>;

    /// Returns the number of rows removed.
    async fn delete_versions(&self, rule_id: Uuid, versions: &[i32]) -> Result<u64, AppError>;

    /// Every rule id that owns at least one version, including rules deleted since.
    async fn versioned_rule_ids(&self) -> Result<Vec<Uuid>, AppError>;
}

/// Both halves of the persistence interface behind one object.
pub trait Store: RuleStore + VersionStore {}

impl<T: RuleStore + VersionStore> Store for T {}
