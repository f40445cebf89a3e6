//! Rule Version Control: append-only snapshot history per rule.
//!
//! Single writer per rule id. Every path that writes versions (snapshot on update,
//! restore, cleanup) first takes the rule's `RuleWriteGuard`. Different rule ids never
//! contend. Version numbers always come from the store, never from the history cache.
//! A lock entry lives only while someone holds or waits on it.

pub mod handlers;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::errors::AppError;
use crate::models::rule::{Rule, RuleVersion};
use crate::rules::RuleCache;
use crate::store::Store;

pub const DEFAULT_ACTOR: &str = "system";

type LockMap = Arc<std::sync::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

/// Proof that the caller holds the write lock for `rule_id`.
pub struct RuleWriteGuard {
    rule_id: Uuid,
    locks: LockMap,
    _guard: OwnedMutexGuard<()>,
}

impl RuleWriteGuard {
    pub fn rule_id(&self) -> Uuid {
        self.rule_id
    }
}

impl Drop for RuleWriteGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference sits in the map and one in `_guard`. Any other is a waiter.
        if locks
            .get(&self.rule_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            locks.remove(&self.rule_id);
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VersionComparison {
    pub rule_id: Uuid,
    pub version1: i32,
    pub version2: i32,
    pub pattern_changed: bool,
    pub suggestion_changed: bool,
    pub description_changed: bool,
    pub category_changed: bool,
    pub priority_changed: bool,
    pub target_section_changed: bool,
    pub active_changed: bool,
}

impl VersionComparison {
    fn between(a: &RuleVersion, b: &RuleVersion) -> Self {
        Self {
            rule_id: a.rule_id,
            version1: a.version,
            version2: b.version,
            pattern_changed: a.pattern != b.pattern,
            suggestion_changed: a.suggestion != b.suggestion,
            description_changed: a.description != b.description,
            category_changed: a.category != b.category,
            priority_changed: a.priority != b.priority,
            target_section_changed: a.target_section != b.target_section,
            active_changed: a.is_active != b.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VersionStatistics {
    pub rule_id: Uuid,
    pub total_versions: usize,
    pub latest_version: i32,
    /// `total_versions - 1`, or 0 when the rule has no history.
    pub modification_count: usize,
    /// Mean gap between consecutive versions in fractional days. 0 with fewer than two versions.
    pub average_modification_interval_days: f64,
    pub last_modified_at: Option<DateTime<Utc>>,
}

/// Builds statistics from a version-descending history.
pub fn summarize(rule_id: Uuid, versions_desc: &[RuleVersion]) -> VersionStatistics {
    let total = versions_desc.len();
    let average_modification_interval_days = if total > 1 {
        let total_secs: i64 = versions_desc
            .windows(2)
            .map(|pair| (pair[0].created_at - pair[1].created_at).num_seconds())
            .sum();
        total_secs as f64 / 86_400.0 / (total - 1) as f64
    } else {
        0.0
    };

    VersionStatistics {
        rule_id,
        total_versions: total,
        latest_version: versions_desc.first().map(|v| v.version).unwrap_or(0),
        modification_count: total.saturating_sub(1),
        average_modification_interval_days,
        last_modified_at: versions_desc.first().map(|v| v.created_at),
    }
}

/// Checks that a version-descending history has unique, gap-free version numbers.
/// The oldest surviving version may be above 1 after retention cleanup.
fn check_contiguous(rule_id: Uuid, versions_desc: &[RuleVersion]) -> Result<(), AppError> {
    for pair in versions_desc.windows(2) {
        if pair[0].version != pair[1].version + 1 {
            error!(
                %rule_id,
                newer = pair[0].version,
                older = pair[1].version,
                "Rule version history is not contiguous"
            );
            return Err(AppError::ConsistencyViolation(format!(
                "rule {rule_id} has version {} followed by {}",
                pair[0].version, pair[1].version
            )));
        }
    }
    Ok(())
}

pub struct VersionControl {
    store: Arc<dyn Store>,
    rule_cache: Arc<RuleCache>,
    history_cache: TtlCache<Uuid, Vec<RuleVersion>>,
    locks: LockMap,
}

impl VersionControl {
    pub fn new(
        store: Arc<dyn Store>,
        rule_cache: Arc<RuleCache>,
        history_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            store,
            rule_cache,
            history_cache: TtlCache::new("version_history", history_ttl, cache_capacity),
            locks: LockMap::default(),
        }
    }

    /// Waits for exclusive write access to one rule's configuration and history.
    pub async fn lock_rule(&self, rule_id: Uuid) -> RuleWriteGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(rule_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        RuleWriteGuard {
            rule_id,
            locks: self.locks.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Snapshots `rule` as its next version.
    pub async fn create_new_version(
        &self,
        rule: &Rule,
        change_reason: &str,
        changed_by: &str,
    ) -> Result<RuleVersion, AppError> {
        let guard = self.lock_rule(rule.id).await;
        self.record_version(&guard, rule, change_reason, changed_by)
            .await
    }

    /// Writes version max+1 and then expires the previous max. Caller holds the rule lock.
    pub async fn record_version(
        &self,
        guard: &RuleWriteGuard,
        rule: &Rule,
        change_reason: &str,
        changed_by: &str,
    ) -> Result<RuleVersion, AppError> {
        if guard.rule_id() != rule.id {
            return Err(AppError::Internal(anyhow!(
                "write guard for rule {} used to version rule {}",
                guard.rule_id(),
                rule.id
            )));
        }

        let previous = self.store.max_version(rule.id).await?;
        let version = RuleVersion::snapshot(
            rule,
            previous.unwrap_or(0) + 1,
            change_reason,
            changed_by,
        );

        self.store.insert_version(&version).await?;
        let expired = match previous {
            Some(previous) => {
                self.store
                    .expire_version(rule.id, previous, version.created_at)
                    .await
            }
            None => Ok(()),
        };
        self.history_cache.invalidate(&rule.id).await;
        expired?;

        info!(
            rule_id = %rule.id,
            version = version.version,
            reason = change_reason,
            "Rule version recorded"
        );
        Ok(version)
    }

    /// Version-descending history.
    pub async fn get_version_history(&self, rule_id: Uuid) -> Result<Vec<RuleVersion>, AppError> {
        if let Some(cached) = self.history_cache.get(&rule_id).await {
            return Ok(cached);
        }

        // Writers hold the rule lock from insert through expire.
        let _guard = self.lock_rule(rule_id).await;
        let loaded_at = self.history_cache.generation().await;
        let versions = self.store.versions_desc(rule_id).await?;
        check_contiguous(rule_id, &versions)?;
        self.history_cache
            .insert(rule_id, versions.clone(), loaded_at)
            .await;
        Ok(versions)
    }

    pub async fn get_version(&self, rule_id: Uuid, version: i32) -> Result<RuleVersion, AppError> {
        self.store
            .get_version(rule_id, version)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Version {version} of rule {rule_id} not found"))
            })
    }

    /// Snapshots the live rule, then overwrites it with version `version`.
    /// The snapshot makes every restore undoable.
    pub async fn restore_to_version(
        &self,
        rule_id: Uuid,
        version: i32,
        restored_by: &str,
    ) -> Result<Rule, AppError> {
        let guard = self.lock_rule(rule_id).await;

        let target = self.get_version(rule_id, version).await?;
        let mut rule = self
            .store
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Rule {rule_id} not found")))?;

        self.record_version(
            &guard,
            &rule,
            &format!("restored to version {version}"),
            restored_by,
        )
        .await?;

        target.restore_onto(&mut rule);
        self.store.update_rule(&rule).await?;
        self.rule_cache.invalidate_all().await;

        info!(%rule_id, version, restored_by, "Rule restored");
        Ok(rule)
    }

    pub async fn compare_versions(
        &self,
        rule_id: Uuid,
        version1: i32,
        version2: i32,
    ) -> Result<VersionComparison, AppError> {
        let a = self.get_version(rule_id, version1).await?;
        let b = self.get_version(rule_id, version2).await?;
        Ok(VersionComparison::between(&a, &b))
    }

    pub async fn get_version_statistics(
        &self,
        rule_id: Uuid,
    ) -> Result<VersionStatistics, AppError> {
        let versions = self.get_version_history(rule_id).await?;
        Ok(summarize(rule_id, &versions))
    }

    /// Deletes every version beyond the newest `keep_versions` of each rule.
    /// Operator-triggered only. Returns the number of versions deleted.
    pub async fn cleanup_expired_versions(&self, keep_versions: usize) -> Result<u64, AppError> {
        if keep_versions == 0 {
            return Err(AppError::Validation(
                "keep_versions must be at least 1".to_string(),
            ));
        }

        let mut total_deleted = 0;
        for rule_id in self.store.versioned_rule_ids().await? {
            let _guard = self.lock_rule(rule_id).await;

            let versions = self.store.versions_desc(rule_id).await?;
            if versions.len() <= keep_versions {
                continue;
            }

            let excess: Vec<i32> = versions[keep_versions..].iter().map(|v| v.version).collect();
            let deleted = self.store.delete_versions(rule_id, &excess).await?;
            self.history_cache.invalidate(&rule_id).await;
            debug!(%rule_id, deleted, "Pruned rule versions");
            total_deleted += deleted;
        }

        info!(keep_versions, total_deleted, "Version cleanup finished");
        Ok(total_deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rule::{RuleInput, TargetSection, VersionStatus};
    use crate::store::{MemoryStore, RuleStore, VersionStore};
    use chrono::Duration as ChronoDuration;

    fn rule(name: &str) -> Rule {
        Rule::from_input(RuleInput {
            name: name.to_string(),
            description: "desc".to_string(),
            category: "content".to_string(),
            target_section: TargetSection::Experience,
            pattern: "负责.*工作".to_string(),
            suggestion: "Quantify it".to_string(),
            priority: Some(4),
            is_active: None,
        })
    }

    fn control(store: Arc<MemoryStore>) -> VersionControl {
        VersionControl::new(
            store,
            Arc::new(TtlCache::new("rules", Duration::from_secs(60), 16)),
            Duration::from_secs(60),
            16,
        )
    }

    async fn seeded(name: &str) -> (Arc<MemoryStore>, VersionControl, Rule) {
        let store = Arc::new(MemoryStore::new());
        let rule = rule(name);
        store.insert_rule(&rule).await.unwrap();
        let vc = control(store.clone());
        (store, vc, rule)
    }

    fn numbers(versions: &[RuleVersion]) -> Vec<i32> {
        versions.iter().map(|v| v.version).collect()
    }

    #[tokio::test]
    async fn test_versions_start_at_one_and_expire_predecessor() {
        let (_store, vc, rule) = seeded("r").await;

        let v1 = vc.create_new_version(&rule, "first", "alice").await.unwrap();
        let v2 = vc.create_new_version(&rule, "second", "bob").await.unwrap();
        assert_eq!((v1.version, v2.version), (1, 2));

        let history = vc.get_version_history(rule.id).await.unwrap();
        assert_eq!(numbers(&history), vec![2, 1]);
        assert_eq!(history[0].status, VersionStatus::Current);
        assert!(history[0].expires_at.is_none());
        assert_eq!(history[1].status, VersionStatus::Expired);
        assert!(history[1].expires_at.is_some());
    }

    #[tokio::test]
    async fn test_history_cache_is_invalidated_on_write() {
        let (_store, vc, rule) = seeded("r").await;
        vc.create_new_version(&rule, "first", "a").await.unwrap();
        assert_eq!(vc.get_version_history(rule.id).await.unwrap().len(), 1);

        vc.create_new_version(&rule, "second", "a").await.unwrap();
        assert_eq!(vc.get_version_history(rule.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_version_is_not_found() {
        let (_store, vc, rule) = seeded("r").await;
        let err = vc.get_version(rule.id, 7).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_snapshots_live_state_first() {
        let (store, vc, mut live) = seeded("r").await;
        vc.create_new_version(&live, "initial", "a").await.unwrap();

        live.pattern = "参与.*项目".to_string();
        live.priority = 1;
        store.update_rule(&live).await.unwrap();
        let pre_restore = live.clone();

        let restored = vc.restore_to_version(live.id, 1, "ops").await.unwrap();
        assert_eq!(restored.pattern, "负责.*工作");
        assert_eq!(restored.priority, 4);

        let history = vc.get_version_history(live.id).await.unwrap();
        let latest = vc.get_version(live.id, history[0].version).await.unwrap();
        assert_eq!(latest.change_reason, "restored to version 1");
        assert_eq!(latest.pattern, pre_restore.pattern);
        assert_eq!(latest.priority, pre_restore.priority);

        // Undoing the restore brings back the pre-restore live state.
        let undone = vc
            .restore_to_version(live.id, latest.version, "ops")
            .await
            .unwrap();
        assert_eq!(undone.pattern, pre_restore.pattern);
        assert_eq!(undone.priority, pre_restore.priority);
        assert_eq!(numbers(&vc.get_version_history(live.id).await.unwrap()), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_restore_unknown_rule_or_version() {
        let (_store, vc, rule) = seeded("r").await;
        let err = vc.restore_to_version(rule.id, 1, "ops").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = vc
            .restore_to_version(Uuid::new_v4(), 1, "ops")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_compare_versions_flags_changed_fields() {
        let (_store, vc, mut live) = seeded("r").await;
        vc.create_new_version(&live, "a", "x").await.unwrap();
        live.priority = 9;
        live.is_active = false;
        vc.create_new_version(&live, "b", "x").await.unwrap();

        let diff = vc.compare_versions(live.id, 1, 2).await.unwrap();
        assert!(diff.priority_changed);
        assert!(diff.active_changed);
        assert!(!diff.pattern_changed);
        assert!(!diff.target_section_changed);
    }

    #[test]
    fn test_summarize_statistics() {
        let base = rule("r");
        let t0 = Utc::now();
        let mut versions: Vec<RuleVersion> = (1..=3)
            .map(|n| RuleVersion::snapshot(&base, n, "x", "y"))
            .collect();
        versions[0].created_at = t0;
        versions[1].created_at = t0 + ChronoDuration::days(1);
        versions[2].created_at = t0 + ChronoDuration::days(3);
        versions.reverse();

        let stats = summarize(base.id, &versions);
        assert_eq!(stats.total_versions, 3);
        assert_eq!(stats.latest_version, 3);
        assert_eq!(stats.modification_count, 2);
        assert!((stats.average_modification_interval_days - 1.5).abs() < 1e-9);
        assert_eq!(stats.last_modified_at, Some(t0 + ChronoDuration::days(3)));
    }

    #[test]
    fn test_summarize_empty_history() {
        let stats = summarize(Uuid::new_v4(), &[]);
        assert_eq!(stats.modification_count, 0);
        assert_eq!(stats.latest_version, 0);
        assert!(stats.last_modified_at.is_none());
    }

    #[test]
    fn test_gap_in_history_is_a_consistency_violation() {
        let base = rule("r");
        let versions = vec![
            RuleVersion::snapshot(&base, 3, "x", "y"),
            RuleVersion::snapshot(&base, 1, "x", "y"),
        ];
        let err = check_contiguous(base.id, &versions).unwrap_err();
        assert!(matches!(err, AppError::ConsistencyViolation(_)));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_newest_versions() {
        let store = Arc::new(MemoryStore::new());
        let vc = control(store.clone());
        let busy = rule("busy");
        let quiet = rule("quiet");
        for _ in 0..5 {
            vc.create_new_version(&busy, "edit", "a").await.unwrap();
        }
        vc.create_new_version(&quiet, "edit", "a").await.unwrap();

        let deleted = vc.cleanup_expired_versions(2).await.unwrap();
        assert_eq!(deleted, 3);

        assert_eq!(numbers(&vc.get_version_history(busy.id).await.unwrap()), vec![5, 4]);
        assert_eq!(numbers(&vc.get_version_history(quiet.id).await.unwrap()), vec![1]);

        // Numbering continues from the surviving max.
        let next = vc.create_new_version(&busy, "edit", "a").await.unwrap();
        assert_eq!(next.version, 6);
    }

    #[tokio::test]
    async fn test_cleanup_never_drops_below_retention_floor() {
        let store = Arc::new(MemoryStore::new());
        let vc = control(store.clone());
        let rules: Vec<Rule> = (0..4).map(|i| rule(&format!("r{i}"))).collect();
        for (i, r) in rules.iter().enumerate() {
            for _ in 0..=i {
                vc.create_new_version(r, "edit", "a").await.unwrap();
            }
        }

        let keep = 2;
        vc.cleanup_expired_versions(keep).await.unwrap();
        for (i, r) in rules.iter().enumerate() {
            let original = i + 1;
            let remaining = vc.get_version_history(r.id).await.unwrap().len();
            assert_eq!(remaining, keep.min(original));
        }
    }

    #[tokio::test]
    async fn test_cleanup_rejects_zero_retention() {
        let (_store, vc, _rule) = seeded("r").await;
        let err = vc.cleanup_expired_versions(0).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_versions_for_same_rule_never_duplicate() {
        let (_store, vc, rule) = seeded("r").await;
        let vc = Arc::new(vc);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let vc = vc.clone();
                let rule = rule.clone();
                tokio::spawn(async move {
                    vc.create_new_version(&rule, &format!("edit {i}"), "w")
                        .await
                        .unwrap()
                        .version
                })
            })
            .collect();

        let mut produced = Vec::new();
        for handle in handles {
            produced.push(handle.await.unwrap());
        }
        produced.sort_unstable();
        assert_eq!(produced, (1..=20).collect::<Vec<i32>>());

        let history = vc.get_version_history(rule.id).await.unwrap();
        let current = history
            .iter()
            .filter(|v| v.status == VersionStatus::Current)
            .count();
        assert_eq!(current, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_versions_for_different_rules_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let vc = Arc::new(control(store));
        let a = rule("a");
        let b = rule("b");

        let mut handles = Vec::new();
        for r in [a.clone(), b.clone()] {
            for _ in 0..10 {
                let vc = vc.clone();
                let r = r.clone();
                handles.push(tokio::spawn(async move {
                    vc.create_new_version(&r, "edit", "w").await.unwrap();
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for r in [a, b] {
            let history = vc.get_version_history(r.id).await.unwrap();
            assert_eq!(numbers(&history), (1..=10).rev().collect::<Vec<i32>>());
        }
    }

    /// Parks every `expire_version` call until released, to observe a writer mid-snapshot.
    struct ParkedExpiryStore {
        inner: MemoryStore,
        parked: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl RuleStore for ParkedExpiryStore {
        async fn insert_rule(&self, rule: &Rule) -> Result<(), AppError> {
            self.inner.insert_rule(rule).await
        }
        async fn update_rule(&self, rule: &Rule) -> Result<(), AppError> {
            self.inner.update_rule(rule).await
        }
        async fn delete_rule(&self, id: Uuid) -> Result<bool, AppError> {
            self.inner.delete_rule(id).await
        }
        async fn get_rule(&self, id: Uuid) -> Result<Option<Rule>, AppError> {
            self.inner.get_rule(id).await
        }
        async fn list_rules(&self) -> Result<Vec<Rule>, AppError> {
            self.inner.list_rules().await
        }
        async fn list_rules_page(&self, offset: i64, limit: i64) -> Result<Vec<Rule>, AppError> {
            self.inner.list_rules_page(offset, limit).await
        }
        async fn active_rules_for_section(
            &self,
            section: TargetSection,
        ) -> Result<Vec<Rule>, AppError> {
            self.inner.active_rules_for_section(section).await
        }
        async fn active_rules(&self) -> Result<Vec<Rule>, AppError> {
            self.inner.active_rules().await
        }
        async fn active_rules_by_category(&self, category: &str) -> Result<Vec<Rule>, AppError> {
            self.inner.active_rules_by_category(category).await
        }
        async fn search_rules(&self, keyword: &str) -> Result<Vec<Rule>, AppError> {
            self.inner.search_rules(keyword).await
        }
        async fn count_rules(&self) -> Result<i64, AppError> {
            self.inner.count_rules().await
        }
    }

    #[async_trait::async_trait]
    impl VersionStore for ParkedExpiryStore {
        async fn insert_version(&self, version: &RuleVersion) -> Result<(), AppError> {
            self.inner.insert_version(version).await
        }
        async fn max_version(&self, rule_id: Uuid) -> Result<Option<i32>, AppError> {
            self.inner.max_version(rule_id).await
        }
        async fn expire_version(
            &self,
            rule_id: Uuid,
            version: i32,
            expires_at: DateTime<Utc>,
        ) -> Result<(), AppError> {
            self.parked.notify_one();
            self.release.notified().await;
            self.inner.expire_version(rule_id, version, expires_at).await
        }
        async fn versions_desc(&self, rule_id: Uuid) -> Result<Vec<RuleVersion>, AppError> {
            self.inner.versions_desc(rule_id).await
        }
        async fn get_version(
            &self,
            rule_id: Uuid,
            version: i32,
        ) -> Result<Option<RuleVersion>, AppError> {
            self.inner.get_version(rule_id, version).await
        }
        async fn delete_versions(&self, rule_id: Uuid, versions: &[i32]) -> Result<u64, AppError> {
            self.inner.delete_versions(rule_id, versions).await
        }
        async fn versioned_rule_ids(&self) -> Result<Vec<Uuid>, AppError> {
            self.inner.versioned_rule_ids().await
        }
    }

    fn current_count(versions: &[RuleVersion]) -> usize {
        versions
            .iter()
            .filter(|v| v.status == VersionStatus::Current)
            .count()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_history_read_during_snapshot_never_caches_two_current_versions() {
        let store = Arc::new(ParkedExpiryStore {
            inner: MemoryStore::new(),
            parked: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let rule = rule("r");
        store.insert_rule(&rule).await.unwrap();
        let vc = Arc::new(VersionControl::new(
            store.clone(),
            Arc::new(TtlCache::new("rules", Duration::from_secs(60), 16)),
            Duration::from_secs(300),
            16,
        ));
        // The first version has no predecessor to expire.
        vc.create_new_version(&rule, "first", "a").await.unwrap();

        let writer = tokio::spawn({
            let vc = vc.clone();
            let rule = rule.clone();
            async move { vc.create_new_version(&rule, "second", "b").await.unwrap() }
        });
        store.parked.notified().await;

        let rule_id = rule.id;
        let reader = tokio::spawn({
            let vc = vc.clone();
            async move { vc.get_version_history(rule_id).await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished(), "history read must wait for the writer");

        store.release.notify_one();
        writer.await.unwrap();
        let during = reader.await.unwrap();
        assert_eq!(numbers(&during), vec![2, 1]);
        assert_eq!(current_count(&during), 1);

        let cached = vc.get_version_history(rule_id).await.unwrap();
        assert_eq!(current_count(&cached), 1);
        let stored = store.inner.versions_desc(rule_id).await.unwrap();
        assert_eq!(current_count(&stored), 1);
    }

    #[tokio::test]
    async fn test_history_cache_dropped_after_predecessor_expires() {
        let (_store, vc, rule) = seeded("r").await;
        vc.create_new_version(&rule, "first", "a").await.unwrap();
        assert_eq!(current_count(&vc.get_version_history(rule.id).await.unwrap()), 1);

        vc.create_new_version(&rule, "second", "b").await.unwrap();
        let history = vc.get_version_history(rule.id).await.unwrap();
        assert_eq!(numbers(&history), vec![2, 1]);
        assert_eq!(history[1].status, VersionStatus::Expired);
        assert_eq!(current_count(&history), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_entries_released_when_uncontended() {
        let (_store, vc, rule) = seeded("r").await;
        let vc = Arc::new(vc);

        let guard = vc.lock_rule(rule.id).await;
        assert_eq!(vc.tracked_locks(), 1);
        drop(guard);
        assert_eq!(vc.tracked_locks(), 0);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let vc = vc.clone();
                let rule = rule.clone();
                tokio::spawn(async move { vc.create_new_version(&rule, "edit", "w").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        vc.get_version_history(Uuid::new_v4()).await.unwrap();
        assert_eq!(vc.tracked_locks(), 0);
    }
}
