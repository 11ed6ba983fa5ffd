//! Sync configuration
//!
//! Built once at startup from environment variables (and an optional `.env`,
//! loaded by the binary) and then passed by reference. Nothing in the engine
//! reads the environment after this point.

use adsync_common::error::validate_identifier;
use std::collections::HashSet;
use std::time::Duration;

use crate::api::graph::{
    GraphApiConfig, DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_HTTP_TIMEOUT_SECS,
};
use crate::backoff::{BackoffPolicy, DEFAULT_LONG_BACKOFF, DEFAULT_REST};
use crate::fetcher::{DEFAULT_INSIGHTS_LIMIT, DEFAULT_PAGE_COOLDOWN, DEFAULT_PAGE_SIZE};
use crate::ledger::DEFAULT_AUDIT_TABLE;
use crate::quota::DEFAULT_QUOTA_SIGNATURES;
use crate::window::{DEFAULT_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS};

pub const DEFAULT_DATASET: &str = "meta_ads_data";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Warehouse connection settings
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct SyncConfig {
    /// Accounts processed in order, one at a time
    pub account_ids: Vec<String>,
    pub access_token: Option<String>,
    pub api_base_url: String,
    pub api_version: String,
    pub http_timeout_secs: u64,
    pub database: Option<DatabaseConfig>,
    pub dataset: String,
    pub audit_table: String,
    pub lookback_days: u32,
    pub page_size: usize,
    pub page_cooldown_secs: u64,
    pub rest_secs: u64,
    pub long_backoff_secs: u64,
    pub insights_limit: usize,
    pub quota_signatures: Vec<String>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("account_ids", &self.account_ids)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("api_version", &self.api_version)
            .field("database", &self.database)
            .field("dataset", &self.dataset)
            .field("audit_table", &self.audit_table)
            .field("lookback_days", &self.lookback_days)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            account_ids: Vec::new(),
            access_token: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            database: None,
            dataset: DEFAULT_DATASET.to_string(),
            audit_table: DEFAULT_AUDIT_TABLE.to_string(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            page_size: DEFAULT_PAGE_SIZE,
            page_cooldown_secs: DEFAULT_PAGE_COOLDOWN.as_secs(),
            rest_secs: DEFAULT_REST.as_secs(),
            long_backoff_secs: DEFAULT_LONG_BACKOFF.as_secs(),
            insights_limit: DEFAULT_INSIGHTS_LIMIT,
            quota_signatures: DEFAULT_QUOTA_SIGNATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Parse `key` if set, otherwise use `default`
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl SyncConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let account_ids = std::env::var("ADSYNC_ACCOUNT_IDS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        let database = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DB_CONNECT_TIMEOUT_SECS,
                )?,
            }),
            _ => None,
        };

        let quota_signatures = match std::env::var("ADSYNC_QUOTA_SIGNATURES") {
            Ok(raw) => split_list(&raw),
            Err(_) => defaults.quota_signatures.clone(),
        };

        let config = Self {
            account_ids,
            access_token: std::env::var("META_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
            api_base_url: std::env::var("META_API_BASE_URL").unwrap_or(defaults.api_base_url),
            api_version: std::env::var("META_API_VERSION").unwrap_or(defaults.api_version),
            http_timeout_secs: env_parse("META_HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            database,
            dataset: std::env::var("ADSYNC_DATASET").unwrap_or(defaults.dataset),
            audit_table: std::env::var("ADSYNC_AUDIT_TABLE").unwrap_or(defaults.audit_table),
            lookback_days: env_parse("ADSYNC_LOOKBACK_DAYS", defaults.lookback_days)?,
            page_size: env_parse("ADSYNC_PAGE_SIZE", defaults.page_size)?,
            page_cooldown_secs: env_parse("ADSYNC_PAGE_COOLDOWN_SECS", defaults.page_cooldown_secs)?,
            rest_secs: env_parse("ADSYNC_REST_SECS", defaults.rest_secs)?,
            long_backoff_secs: env_parse("ADSYNC_LONG_BACKOFF_SECS", defaults.long_backoff_secs)?,
            insights_limit: env_parse("ADSYNC_INSIGHTS_LIMIT", defaults.insights_limit)?,
            quota_signatures,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.account_ids.is_empty() {
            anyhow::bail!("ADSYNC_ACCOUNT_IDS must list at least one account");
        }
        let mut seen = HashSet::new();
        for id in &self.account_ids {
            if !seen.insert(id.as_str()) {
                anyhow::bail!("Duplicate account in ADSYNC_ACCOUNT_IDS: {}", id);
            }
        }
        if self.page_size == 0 {
            anyhow::bail!("ADSYNC_PAGE_SIZE must be greater than 0");
        }
        if self.lookback_days == 0 {
            anyhow::bail!("ADSYNC_LOOKBACK_DAYS must be greater than 0");
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            anyhow::bail!(
                "ADSYNC_LOOKBACK_DAYS must be at most {} (got {})",
                MAX_LOOKBACK_DAYS,
                self.lookback_days
            );
        }
        if self.insights_limit == 0 {
            anyhow::bail!("ADSYNC_INSIGHTS_LIMIT must be greater than 0");
        }
        validate_identifier(&self.dataset)
            .map_err(|e| anyhow::anyhow!("ADSYNC_DATASET: {}", e))?;
        validate_identifier(&self.audit_table)
            .map_err(|e| anyhow::anyhow!("ADSYNC_AUDIT_TABLE: {}", e))?;
        Ok(())
    }

    /// Settings for the live Graph API client; requires an access token
    pub fn graph_api(&self) -> anyhow::Result<GraphApiConfig> {
        let token = self
            .access_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("META_ACCESS_TOKEN is not set"))?;
        Ok(GraphApiConfig {
            base_url: self.api_base_url.clone(),
            api_version: self.api_version.clone(),
            access_token: token,
            timeout_secs: self.http_timeout_secs,
        })
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            rest: Duration::from_secs(self.rest_secs),
            long_backoff: Duration::from_secs(self.long_backoff_secs),
        }
    }

    pub fn page_cooldown(&self) -> Duration {
        Duration::from_secs(self.page_cooldown_secs)
    }

    /// Restrict to `only` (if non-empty), keeping configured order
    pub fn select_accounts(&self, only: &[String]) -> anyhow::Result<Vec<String>> {
        if only.is_empty() {
            return Ok(self.account_ids.clone());
        }
        for id in only {
            if !self.account_ids.contains(id) {
                anyhow::bail!("Account {} is not in ADSYNC_ACCOUNT_IDS", id);
            }
        }
        Ok(self
            .account_ids
            .iter()
            .filter(|id| only.contains(id))
            .cloned()
            .collect())
    }
}
