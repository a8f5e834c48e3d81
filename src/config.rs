//! Configuration loader and validator for the claims sync service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::http::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub marketplace: Marketplace,
    pub secrets: Secrets,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub heuristics: Heuristics,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub listen_addr: String,
    /// Shared secret presented by trusted background callers.
    pub internal_token: String,
}

/// External marketplace API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Marketplace {
    pub base_url: String,
    pub provider: String,
}

/// Internal secret-resolution endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secrets {
    pub base_url: String,
    pub token: String,
    #[serde(default = "default_secrets_timeout_ms")]
    pub timeout_ms: u64,
}

/// Listing, enrichment and cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    pub page_size: u32,
    pub max_pages: u32,
    pub batch_size: usize,
    pub list_timeout_ms: u64,
    pub enrich_timeout_ms: u64,
    pub overall_timeout_seconds: u64,
    pub default_lookback_days: i64,
    pub cache_ttl_seconds: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pages: 200,
            batch_size: 10,
            list_timeout_ms: 30_000,
            enrich_timeout_ms: 5_000,
            overall_timeout_seconds: 120,
            default_lookback_days: 60,
            cache_ttl_seconds: 300,
        }
    }
}

impl SyncSettings {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_millis(self.enrich_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_seconds)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_seconds)
    }
}

/// Outbound retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            jitter: 0.25,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            jitter: self.jitter,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Thresholds behind the classification heuristics of the field mapper.
///
/// These are tunables rather than business rules: downstream consumers that
/// need the historical scores keep the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Heuristics {
    /// Claimed amount at or above which a claim counts as high value.
    pub high_amount: f64,
    /// Claimed amount at or above which a claim counts as medium value.
    pub medium_amount: f64,
    /// Message count at or above which a thread counts as long.
    pub long_thread_messages: u32,
    /// Highest message count still rated "low" communication.
    pub low_communication_max: u32,
    /// Highest message count still rated "moderate" communication.
    pub moderate_communication_max: u32,
    /// Resolution in at most this many hours is "fast".
    pub fast_resolution_hours: f64,
    /// Resolution in at most this many hours is "normal"; slower is "slow".
    pub normal_resolution_hours: f64,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            high_amount: 500.0,
            medium_amount: 100.0,
            long_thread_messages: 10,
            low_communication_max: 2,
            moderate_communication_max: 9,
            fast_resolution_hours: 48.0,
            normal_resolution_hours: 168.0,
        }
    }
}

fn default_secrets_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default SQLite location inside the data directory.
    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}/claims.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.listen_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.listen_addr must be non-empty"));
    }
    if cfg.app.internal_token.trim().is_empty() {
        return Err(ConfigError::Invalid("app.internal_token must be non-empty"));
    }

    if reqwest::Url::parse(&cfg.marketplace.base_url).is_err() {
        return Err(ConfigError::Invalid("marketplace.base_url must be a valid URL"));
    }
    if cfg.marketplace.provider.trim().is_empty() {
        return Err(ConfigError::Invalid("marketplace.provider must be non-empty"));
    }

    if reqwest::Url::parse(&cfg.secrets.base_url).is_err() {
        return Err(ConfigError::Invalid("secrets.base_url must be a valid URL"));
    }
    if cfg.secrets.token.trim().is_empty() {
        return Err(ConfigError::Invalid("secrets.token must be non-empty"));
    }

    let s = &cfg.sync;
    if s.page_size == 0 {
        return Err(ConfigError::Invalid("sync.page_size must be > 0"));
    }
    if s.max_pages == 0 {
        return Err(ConfigError::Invalid("sync.max_pages must be > 0"));
    }
    if s.batch_size == 0 {
        return Err(ConfigError::Invalid("sync.batch_size must be > 0"));
    }
    if s.list_timeout_ms == 0 || s.enrich_timeout_ms == 0 {
        return Err(ConfigError::Invalid("sync timeouts must be > 0"));
    }
    if s.overall_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("sync.overall_timeout_seconds must be > 0"));
    }
    if s.default_lookback_days <= 0 {
        return Err(ConfigError::Invalid("sync.default_lookback_days must be > 0"));
    }
    if s.cache_ttl_seconds <= 0 {
        return Err(ConfigError::Invalid("sync.cache_ttl_seconds must be > 0"));
    }

    if cfg.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid("retry.max_attempts must be >= 1"));
    }
    if !(0.0..1.0).contains(&cfg.retry.jitter) {
        return Err(ConfigError::Invalid("retry.jitter must be in [0, 1)"));
    }
    if cfg.retry.max_delay_ms < cfg.retry.base_delay_ms {
        return Err(ConfigError::Invalid("retry.max_delay_ms must be >= retry.base_delay_ms"));
    }

    let h = &cfg.heuristics;
    if h.medium_amount > h.high_amount {
        return Err(ConfigError::Invalid("heuristics.medium_amount must be <= high_amount"));
    }
    if h.low_communication_max > h.moderate_communication_max {
        return Err(ConfigError::Invalid(
            "heuristics.low_communication_max must be <= moderate_communication_max",
        ));
    }
    if h.fast_resolution_hours > h.normal_resolution_hours {
        return Err(ConfigError::Invalid(
            "heuristics.fast_resolution_hours must be <= normal_resolution_hours",
        ));
    }

    Ok(())
}

/// Returns the documented example YAML.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  listen_addr: "127.0.0.1:8080"
  internal_token: "YOUR_INTERNAL_SERVICE_TOKEN"

marketplace:
  base_url: "https://api.mercadolibre.com/"
  provider: "mercadolivre"

secrets:
  base_url: "http://127.0.0.1:9000/"
  token: "YOUR_SECRET_SERVICE_TOKEN"
  timeout_ms: 5000

sync:
  page_size: 50
  max_pages: 200
  batch_size: 10
  list_timeout_ms: 30000
  enrich_timeout_ms: 5000
  overall_timeout_seconds: 120
  default_lookback_days: 60
  cache_ttl_seconds: 300

retry:
  max_attempts: 3
  base_delay_ms: 1000
  jitter: 0.25
  max_delay_ms: 30000

heuristics:
  high_amount: 500.0
  medium_amount: 100.0
  long_thread_messages: 10
  low_communication_max: 2
  moderate_communication_max: 9
  fast_resolution_hours: 48.0
  normal_resolution_hours: 168.0
"#
}
