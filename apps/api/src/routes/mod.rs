pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::effects::handlers as effects;
use crate::rules::handlers as rules;
use crate::state::AppState;
use crate::versioning::handlers as versions;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Rule catalog and matching
        .route(
            "/api/v1/rules",
            get(rules::handle_list_rules).post(rules::handle_create_rule),
        )
        .route("/api/v1/rules/page", get(rules::handle_rules_page))
        .route("/api/v1/rules/active", get(rules::handle_active_rules))
        .route("/api/v1/rules/categories", get(rules::handle_categories))
        .route(
            "/api/v1/rules/category/:category",
            get(rules::handle_rules_by_category),
        )
        .route("/api/v1/rules/search", get(rules::handle_search_rules))
        .route(
            "/api/v1/rules/statistics",
            get(rules::handle_catalog_statistics),
        )
        .route("/api/v1/rules/apply", post(rules::handle_apply_rules))
        .route("/api/v1/rules/batch-apply", post(rules::handle_batch_apply))
        .route(
            "/api/v1/rules/:id",
            get(rules::handle_get_rule)
                .put(rules::handle_update_rule)
                .delete(rules::handle_delete_rule),
        )
        .route("/api/v1/rules/:id/status", patch(rules::handle_toggle_status))
        // Version control
        .route(
            "/api/v1/rules/:id/versions",
            get(versions::handle_version_history),
        )
        .route(
            "/api/v1/rules/:id/versions/compare",
            get(versions::handle_compare_versions),
        )
        .route(
            "/api/v1/rules/:id/versions/statistics",
            get(versions::handle_version_statistics),
        )
        .route(
            "/api/v1/rules/:id/versions/:v",
            get(versions::handle_get_version),
        )
        .route(
            "/api/v1/rules/:id/versions/:v/restore",
            post(versions::handle_restore_version),
        )
        .route(
            "/api/v1/rule-versions/cleanup",
            post(versions::handle_cleanup_versions),
        )
        // Effect evaluation
        .route("/api/v1/rules/:id/evaluations", post(effects::handle_evaluate))
        .route("/api/v1/rules/:id/feedback", post(effects::handle_feedback))
        .route("/api/v1/rules/:id/effect", get(effects::handle_effect_report))
        .route("/api/v1/rule-effects/rankings", get(effects::handle_rankings))
        .with_state(state)
}
