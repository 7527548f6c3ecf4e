//! Crawler configuration.
//!
//! Every field has a default; `CRAWLER_*` environment variables (optionally
//! from a `.env` file) override them.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::RetryPolicy;
use crate::crawl::TransferConfig;
use crate::job::StoreConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::{Error, Result};

/// Default registry base URL.
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:8080/api/v3";

/// Top-level configuration for the crawler binary and its components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub transfers: TransferConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Base URL of the digital twin registry.
    #[serde(default = "default_registry_url")]
    pub registry_url: String,
    /// Per-request timeout of the HTTP collaborators (0 disables it).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Root directory of the file blob store; in-memory when unset.
    #[serde(default)]
    pub blob_dir: Option<PathBuf>,
    /// Log filter directive; falls back to `RUST_LOG` and then the default.
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Directory for the rolling log file; console only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            transfers: TransferConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            retry: RetryPolicy::default(),
            registry_url: default_registry_url(),
            request_timeout_secs: default_request_timeout_secs(),
            blob_dir: None,
            log_filter: None,
            log_dir: None,
        }
    }
}

impl CrawlerConfig {
    /// Load `.env` (if present) and apply `CRAWLER_*` overrides to the defaults.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup` to the defaults.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("CRAWLER_LOCK_TIMEOUT_MS") {
            config.store.lock_timeout_ms = parse_value("CRAWLER_LOCK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("CRAWLER_MAX_CONCURRENT_TRANSFERS") {
            let max: usize = parse_value("CRAWLER_MAX_CONCURRENT_TRANSFERS", &v)?;
            if max == 0 {
                return Err(Error::config(
                    "CRAWLER_MAX_CONCURRENT_TRANSFERS must be at least 1",
                ));
            }
            config.transfers.max_concurrent = max;
        }
        if let Some(v) = get("CRAWLER_TRANSFER_TIMEOUT_SECS") {
            config.transfers.timeout_secs = parse_value("CRAWLER_TRANSFER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CRAWLER_ERROR_ON_INITIAL_START_FAILURE") {
            config.orchestrator.error_on_initial_start_failure =
                parse_bool("CRAWLER_ERROR_ON_INITIAL_START_FAILURE", &v)?;
        }

        if let Some(v) = get("CRAWLER_RETRY_MAX_RETRIES") {
            config.retry.max_retries = parse_value("CRAWLER_RETRY_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("CRAWLER_RETRY_INITIAL_DELAY_MS") {
            config.retry.initial_delay_ms = parse_value("CRAWLER_RETRY_INITIAL_DELAY_MS", &v)?;
        }
        if let Some(v) = get("CRAWLER_RETRY_MAX_DELAY_MS") {
            config.retry.max_delay_ms = parse_value("CRAWLER_RETRY_MAX_DELAY_MS", &v)?;
        }
        if let Some(v) = get("CRAWLER_RETRY_BACKOFF_MULTIPLIER") {
            let multiplier: f64 = parse_value("CRAWLER_RETRY_BACKOFF_MULTIPLIER", &v)?;
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(Error::config(format!(
                    "CRAWLER_RETRY_BACKOFF_MULTIPLIER must be a finite number >= 1.0, got {v}"
                )));
            }
            config.retry.backoff_multiplier = multiplier;
        }
        if let Some(v) = get("CRAWLER_RETRY_USE_JITTER") {
            config.retry.use_jitter = parse_bool("CRAWLER_RETRY_USE_JITTER", &v)?;
        }

        if let Some(v) = get("CRAWLER_REGISTRY_URL") {
            config.registry_url = v;
        }
        if let Some(v) = get("CRAWLER_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_value("CRAWLER_REQUEST_TIMEOUT_SECS", &v)?;
        }
        config.blob_dir = get("CRAWLER_BLOB_DIR").map(PathBuf::from);
        config.log_filter = get("CRAWLER_LOG_FILTER");
        config.log_dir = get("CRAWLER_LOG_DIR").map(PathBuf::from);

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| Error::config(format!("invalid value '{raw}' for {key}: {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!(
            "invalid value '{raw}' for {key}: expected a boolean"
        ))),
    }
}
