use std::sync::Arc;

use crate::config::Config;
use crate::effects::stats::EffectStatsStore;
use crate::effects::EffectEvaluator;
use crate::llm_client::TextImprover;
use crate::rules::{RuleCache, RuleEngine};
use crate::store::Store;
use crate::versioning::VersionControl;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub rules: Arc<RuleEngine>,
    pub versions: Arc<VersionControl>,
    pub effects: Arc<EffectEvaluator>,
    pub config: Config,
}

impl AppState {
    /// Wires the three services over shared backends. The applicable-rules cache is
    /// shared so restores and catalog writes clear the same entries.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        stats: Arc<dyn EffectStatsStore>,
        improver: Arc<dyn TextImprover>,
    ) -> Self {
        let rule_cache = Arc::new(RuleCache::new(
            "applicable_rules",
            config.rule_cache_ttl,
            config.cache_capacity,
        ));
        let versions = Arc::new(VersionControl::new(
            store.clone(),
            rule_cache.clone(),
            config.rule_cache_ttl,
            config.cache_capacity,
        ));
        let rules = Arc::new(RuleEngine::new(
            store.clone(),
            improver.clone(),
            versions.clone(),
            rule_cache,
            config.ai_timeout,
            config.ai_concurrency,
        ));
        let effects = Arc::new(EffectEvaluator::new(
            store,
            stats,
            improver,
            config.ai_timeout,
            config.report_cache_ttl,
            config.cache_capacity,
        ));

        Self {
            rules,
            versions,
            effects,
            config,
        }
    }
}
