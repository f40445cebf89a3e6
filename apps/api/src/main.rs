mod cache;
mod config;
mod db;
mod effects;
mod errors;
mod llm_client;
mod models;
mod routes;
mod rules;
mod state;
mod store;
mod versioning;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::effects::stats::{EffectStatsStore, MemoryEffectStats, RedisEffectStats};
use crate::llm_client::{DisabledImprover, LlmClient, TextImprover};
use crate::routes::build_router;
use crate::rules::defaults::seed_default_rules;
use crate::state::AppState;
use crate::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rule engine v{}", env!("CARGO_PKG_VERSION"));

    // Rule catalog and version history
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::new(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set, rules and versions are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    // Effect statistics
    let stats: Arc<dyn EffectStatsStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Redis effect statistics enabled");
            Arc::new(RedisEffectStats::new(client))
        }
        None => {
            warn!("REDIS_URL not set, effect statistics reset on restart");
            Arc::new(MemoryEffectStats::new())
        }
    };

    // Text improvement backend
    let improver: Arc<dyn TextImprover> = match &config.anthropic_api_key {
        Some(key) => {
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Arc::new(LlmClient::new(key.clone()))
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set, static rule suggestions only");
            Arc::new(DisabledImprover)
        }
    };

    let state = AppState::new(config.clone(), store, stats, improver);

    if config.seed_default_rules {
        seed_default_rules(&state.rules).await?;
    }

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
