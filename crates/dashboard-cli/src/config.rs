use anyhow::{ensure, Context, Result};
use research_client::ClientConfig;
use std::env;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5001";
const DEFAULT_MARKET_API_BASE_URL: &str = "http://127.0.0.1:5002";
const DEFAULT_DATABASE_URL: &str = "sqlite:dashboard.db";

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub client: ClientConfig,
    pub database_url: String,
    /// Entries shown by `history`
    pub history_limit: i64,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let timeout_secs: u64 = get("REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .context("REQUEST_TIMEOUT_SECS must be a whole number of seconds")?;
        ensure!(timeout_secs > 0, "REQUEST_TIMEOUT_SECS must be positive");

        let cache_ttl_secs: u64 = get("CATALOG_CACHE_TTL_SECS", "300")
            .parse()
            .context("CATALOG_CACHE_TTL_SECS must be a whole number of seconds")?;

        let history_limit: i64 = get("HISTORY_LIMIT", "20")
            .parse()
            .context("HISTORY_LIMIT must be a number")?;
        ensure!(history_limit > 0, "HISTORY_LIMIT must be positive");

        Ok(Self {
            client: ClientConfig {
                api_base_url: base_url("API_BASE_URL", get("API_BASE_URL", DEFAULT_API_BASE_URL))?,
                market_base_url: base_url(
                    "MARKET_API_BASE_URL",
                    get("MARKET_API_BASE_URL", DEFAULT_MARKET_API_BASE_URL),
                )?,
                timeout: Duration::from_secs(timeout_secs),
                cache_ttl: Duration::from_secs(cache_ttl_secs),
            },
            database_url: get("DATABASE_URL", DEFAULT_DATABASE_URL),
            history_limit,
        })
    }
}

fn base_url(name: &str, value: String) -> Result<String> {
    let value = value.trim().trim_end_matches('/').to_string();
    ensure!(
        value.starts_with("http://") || value.starts_with("https://"),
        "{} must be an http(s) URL, got '{}'",
        name,
        value
    );
    Ok(value)
}
