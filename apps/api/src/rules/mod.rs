//! Rule Matching Engine: rule catalog operations and the match/suggest pipeline.
//!
//! Applicable-rule lookups are cached per target section. Every mutation clears the
//! whole cache before returning, since a rule can move between sections on update.

pub mod defaults;
pub mod handlers;
pub mod matcher;
pub mod prompts;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::errors::AppError;
use crate::llm_client::{improve_with_timeout, TextImprover};
use crate::models::rule::{Rule, RuleInput, TargetSection};
use crate::store::Store;
use crate::versioning::VersionControl;

/// Applicable active rules keyed by the section they were requested for.
pub type RuleCache = TtlCache<TargetSection, Vec<Rule>>;

/// Result-map key for the pass over `ALL`-targeted rules in a batch run.
pub const GENERAL_SECTION: &str = "GENERAL";

pub const UPDATE_REASON_DEFAULT: &str = "updated rule configuration";

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub rule: Rule,
    pub matches: Vec<String>,
    pub match_count: usize,
    pub optimized_suggestion: Option<String>,
    pub error: Option<String>,
    pub applied_at: DateTime<Utc>,
}

impl OptimizationResult {
    fn new(rule: &Rule) -> Self {
        Self {
            rule: rule.clone(),
            matches: Vec::new(),
            match_count: 0,
            optimized_suggestion: None,
            error: None,
            applied_at: Utc::now(),
        }
    }

    pub fn has_matches(&self) -> bool {
        self.match_count > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub section_results: BTreeMap<String, Vec<OptimizationResult>>,
    pub processed_at: DateTime<Utc>,
    pub total_matches: usize,
    pub total_rules_applied: usize,
}

impl BatchResult {
    fn from_sections(section_results: BTreeMap<String, Vec<OptimizationResult>>) -> Self {
        let total_matches = section_results
            .values()
            .flatten()
            .map(|r| r.match_count)
            .sum();
        let total_rules_applied = section_results.values().map(Vec::len).sum();
        Self {
            section_results,
            processed_at: Utc::now(),
            total_matches,
            total_rules_applied,
        }
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct RulePage {
    pub content: Vec<Rule>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleCatalogStatistics {
    pub total_rules: usize,
    pub active_rules: usize,
    pub inactive_rules: usize,
    pub category_count: usize,
    pub categories: Vec<String>,
}

pub struct RuleEngine {
    store: Arc<dyn Store>,
    improver: Arc<dyn TextImprover>,
    versions: Arc<VersionControl>,
    cache: Arc<RuleCache>,
    ai_timeout: Duration,
    concurrency: usize,
}

impl RuleEngine {
    pub fn new(
        store: Arc<dyn Store>,
        improver: Arc<dyn TextImprover>,
        versions: Arc<VersionControl>,
        cache: Arc<RuleCache>,
        ai_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            improver,
            versions,
            cache,
            ai_timeout,
            concurrency: concurrency.max(1),
        }
    }

    // ── Matching ────────────────────────────────────────────────────────────

    /// Active, valid rules for `section`, priority descending.
    /// A concrete section yields only rules targeting it; `ALL` or `None` yields only
    /// rules targeting `ALL`.
    pub async fn get_applicable_rules(
        &self,
        section: Option<TargetSection>,
    ) -> Result<Vec<Rule>, AppError> {
        let key = section.unwrap_or(TargetSection::All);
        if let Some(rules) = self.cache.get(&key).await {
            return Ok(rules);
        }

        let loaded_at = self.cache.generation().await;
        let rules: Vec<Rule> = self
            .store
            .active_rules_for_section(key)
            .await?
            .into_iter()
            .filter(|rule| {
                let ok = matcher::is_applicable(rule);
                if !ok {
                    warn!(rule_id = %rule.id, "Skipping rule with empty or invalid pattern");
                }
                ok
            })
            .collect();

        self.cache.insert(key, rules.clone(), loaded_at).await;
        Ok(rules)
    }

    /// Scans `content` with one rule. Never fails: pattern errors are carried on the result,
    /// and AI errors fall back to the rule's static suggestion.
    pub async fn apply_rule(&self, rule: &Rule, content: &str) -> OptimizationResult {
        let mut result = OptimizationResult::new(rule);

        if !rule.has_pattern() {
            result.error = Some("rule has no pattern".to_string());
            return result;
        }

        let regex = match matcher::compile(&rule.pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "Rule pattern failed to compile");
                result.error = Some(format!("invalid pattern: {e}"));
                return result;
            }
        };

        result.matches = matcher::find_matches(&regex, content);
        result.match_count = result.matches.len();
        if result.matches.is_empty() {
            return result;
        }

        let context = prompts::suggestion_context(rule, &result.matches, content);
        let suggestion = match improve_with_timeout(
            self.improver.as_ref(),
            &context,
            &rule.category,
            self.ai_timeout,
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "AI suggestion failed, using static suggestion");
                matcher::fallback_suggestion(rule)
            }
        };
        result.optimized_suggestion = Some(suggestion);
        result
    }

    /// Applies every applicable rule and keeps those with matches, in rule priority order.
    pub async fn apply_all_rules(
        &self,
        content: &str,
        section: Option<TargetSection>,
    ) -> Result<Vec<OptimizationResult>, AppError> {
        require_content(content)?;
        self.apply_section(content, section).await
    }

    async fn apply_section(
        &self,
        content: &str,
        section: Option<TargetSection>,
    ) -> Result<Vec<OptimizationResult>, AppError> {
        let rules = self.get_applicable_rules(section).await?;
        let rule_count = rules.len();

        let results: Vec<OptimizationResult> = stream::iter(rules)
            .map(move |rule| async move { self.apply_rule(&rule, content).await })
            .buffered(self.concurrency)
            .filter(|result| futures::future::ready(result.has_matches()))
            .collect()
            .await;

        debug!(
            section = ?section,
            rules = rule_count,
            matched = results.len(),
            "Applied rules"
        );
        Ok(results)
    }

    /// One pass per concrete section plus a general pass over `ALL`-targeted rules.
    pub async fn batch_apply_rules(&self, content: &str) -> Result<BatchResult, AppError> {
        require_content(content)?;
        let mut sections = BTreeMap::new();
        for section in TargetSection::CONCRETE {
            let results = self.apply_section(content, Some(section)).await?;
            sections.insert(section.as_str().to_string(), results);
        }
        let general = self.apply_section(content, Some(TargetSection::All)).await?;
        sections.insert(GENERAL_SECTION.to_string(), general);

        let batch = BatchResult::from_sections(sections);
        info!(
            total_matches = batch.total_matches,
            total_rules_applied = batch.total_rules_applied,
            "Batch rule application finished"
        );
        Ok(batch)
    }

    // ── Catalog writes ──────────────────────────────────────────────────────

    pub async fn create_rule(&self, input: RuleInput) -> Result<Rule, AppError> {
        validate_input(&input)?;
        let rule = Rule::from_input(input);
        self.store.insert_rule(&rule).await?;
        self.cache.invalidate_all().await;
        info!(rule_id = %rule.id, name = %rule.name, "Rule created");
        Ok(rule)
    }

    /// Snapshots the pre-update state as a new version, then persists `input`.
    pub async fn update_rule(
        &self,
        id: Uuid,
        input: RuleInput,
        change_reason: &str,
        changed_by: &str,
    ) -> Result<Rule, AppError> {
        validate_input(&input)?;
        let guard = self.versions.lock_rule(id).await;

        let mut rule = self.get_rule(id).await?;
        self.versions
            .record_version(&guard, &rule, change_reason, changed_by)
            .await?;

        rule.apply_input(input);
        self.store.update_rule(&rule).await?;
        self.cache.invalidate_all().await;
        info!(rule_id = %id, name = %rule.name, "Rule updated");
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: Uuid) -> Result<(), AppError> {
        let _guard = self.versions.lock_rule(id).await;
        if !self.store.delete_rule(id).await? {
            return Err(AppError::NotFound(format!("Rule {id} not found")));
        }
        self.cache.invalidate_all().await;
        info!(rule_id = %id, "Rule deleted");
        Ok(())
    }

    pub async fn toggle_rule_status(&self, id: Uuid, is_active: bool) -> Result<Rule, AppError> {
        let _guard = self.versions.lock_rule(id).await;
        let mut rule = self.get_rule(id).await?;
        rule.is_active = is_active;
        rule.updated_at = Utc::now();
        self.store.update_rule(&rule).await?;
        self.cache.invalidate_all().await;
        info!(rule_id = %id, is_active, "Rule status changed");
        Ok(rule)
    }

    // ── Catalog reads ───────────────────────────────────────────────────────

    pub async fn get_rule(&self, id: Uuid) -> Result<Rule, AppError> {
        self.store
            .get_rule(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Rule {id} not found")))
    }

    pub async fn list_rules(&self) -> Result<Vec<Rule>, AppError> {
        self.store.list_rules().await
    }

    /// Zero-based page of `list_rules`.
    pub async fn list_rules_page(&self, page: u32, size: u32) -> Result<RulePage, AppError> {
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(AppError::Validation(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        let total_elements = self.store.count_rules().await?;
        let content = self
            .store
            .list_rules_page(i64::from(page) * i64::from(size), i64::from(size))
            .await?;
        Ok(RulePage {
            content,
            page,
            size,
            total_elements,
            total_pages: (total_elements + i64::from(size) - 1) / i64::from(size),
        })
    }

    pub async fn list_active_rules(&self) -> Result<Vec<Rule>, AppError> {
        self.store.active_rules().await
    }

    pub async fn rules_by_category(&self, category: &str) -> Result<Vec<Rule>, AppError> {
        self.store.active_rules_by_category(category).await
    }

    pub async fn search_rules(&self, keyword: &str) -> Result<Vec<Rule>, AppError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(AppError::Validation("search keyword must not be empty".to_string()));
        }
        self.store.search_rules(keyword).await
    }

    pub async fn count_rules(&self) -> Result<i64, AppError> {
        self.store.count_rules().await
    }

    /// Distinct non-empty categories, sorted.
    pub async fn categories(&self) -> Result<Vec<String>, AppError> {
        Ok(collect_categories(&self.store.list_rules().await?))
    }

    pub async fn catalog_statistics(&self) -> Result<RuleCatalogStatistics, AppError> {
        let rules = self.store.list_rules().await?;
        let active = rules.iter().filter(|r| r.is_active).count();
        let categories = collect_categories(&rules);
        Ok(RuleCatalogStatistics {
            total_rules: rules.len(),
            active_rules: active,
            inactive_rules: rules.len() - active,
            category_count: categories.len(),
            categories,
        })
    }
}

fn collect_categories(rules: &[Rule]) -> Vec<String> {
    rules
        .iter()
        .map(|r| r.category.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn require_content(content: &str) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::Validation("resume content must not be empty".to_string()));
    }
    Ok(())
}

fn validate_input(input: &RuleInput) -> Result<(), AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::Validation("rule name must not be empty".to_string()));
    }
    matcher::validate_pattern(&input.pattern)
}
