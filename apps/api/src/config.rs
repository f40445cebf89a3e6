use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
///
/// Every backing service is optional. Without `DATABASE_URL` the rule catalog lives
/// in memory, without `REDIS_URL` effect statistics reset on restart, and without
/// `ANTHROPIC_API_KEY` suggestions fall back to each rule's static text.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub ai_timeout: Duration,
    pub ai_concurrency: usize,
    pub rule_cache_ttl: Duration,
    pub report_cache_ttl: Duration,
    pub cache_capacity: usize,
    pub version_retention: usize,
    pub seed_default_rules: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            redis_url: optional_env("REDIS_URL"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            ai_timeout: Duration::from_secs(parse_env("AI_TIMEOUT_SECS", 30)?),
            ai_concurrency: parse_env::<usize>("AI_CONCURRENCY", 4)?.max(1),
            rule_cache_ttl: Duration::from_secs(parse_env("RULE_CACHE_TTL_SECS", 300)?),
            report_cache_ttl: Duration::from_secs(parse_env("REPORT_CACHE_TTL_SECS", 60)?),
            cache_capacity: parse_env::<usize>("CACHE_CAPACITY", 1024)?.max(1),
            version_retention: parse_env("VERSION_RETENTION", 10)?,
            seed_default_rules: parse_env("SEED_DEFAULT_RULES", true)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            anthropic_api_key: None,
            port: 8080,
            rust_log: "info".to_string(),
            ai_timeout: Duration::from_secs(30),
            ai_concurrency: 4,
            rule_cache_ttl: Duration::from_secs(300),
            report_cache_ttl: Duration::from_secs(60),
            cache_capacity: 1024,
            version_retention: 10,
            seed_default_rules: true,
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_falls_back_to_default() {
        let value: u64 = parse_env("RULE_ENGINE_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("RULE_ENGINE_TEST_BAD_PORT", "not-a-port");
        let result: Result<u16> = parse_env("RULE_ENGINE_TEST_BAD_PORT", 8080);
        assert!(result.is_err());
        std::env::remove_var("RULE_ENGINE_TEST_BAD_PORT");
    }

    #[test]
    fn test_blank_env_treated_as_unset() {
        std::env::set_var("RULE_ENGINE_TEST_BLANK", "   ");
        assert!(optional_env("RULE_ENGINE_TEST_BLANK").is_none());
        std::env::remove_var("RULE_ENGINE_TEST_BLANK");
    }
}
