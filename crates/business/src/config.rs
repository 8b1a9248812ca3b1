//! Ledger configuration
//!
//! Loaded from TOML. Every section is optional and falls back to the
//! production defaults below.
//!
//! ```toml
//! [database]
//! url = "sqlite:data/fanledger.db"
//!
//! [commission]
//! platform_fee_rate = "0.05"
//!
//! [accounting]
//! endpoint = "http://127.0.0.1:8088/api/transactions"
//! timeout_secs = 10
//! max_attempts = 5
//!
//! [rate_limit]
//! spend_limit = 10
//! spend_window_secs = 60
//! ```

use fanledger_core::CommissionPolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found
    #[error("config file not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("validation error: {0}")]
    Validation(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub commission: CommissionConfig,

    #[serde(default)]
    pub ledger: LedgerTuning,

    #[serde(default)]
    pub accounting: AccountingConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite:data/fanledger.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// Platform side of the commission split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Fraction in [0, 1] taken before any other share
    #[serde(default = "default_platform_fee_rate")]
    pub platform_fee_rate: Decimal,
}

fn default_platform_fee_rate() -> Decimal {
    Decimal::new(5, 2)
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: default_platform_fee_rate(),
        }
    }
}

/// Balance update tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTuning {
    /// How many times a balance transaction is re-run after a conflict
    #[serde(default = "default_max_cas_retries")]
    pub max_cas_retries: u32,
}

fn default_max_cas_retries() -> u32 {
    5
}

impl Default for LedgerTuning {
    fn default() -> Self {
        Self {
            max_cas_retries: default_max_cas_retries(),
        }
    }
}

/// External accounting system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingConfig {
    /// HTTP endpoint receiving transaction records; export disabled when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Sent as `Authorization: Bearer <key>`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts before an entry is marked FAILED
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first queued retry
    #[serde(default = "default_initial_retry")]
    pub initial_retry_secs: u64,

    /// Sweeper tick
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Entries picked up per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_retry() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    50
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            initial_retry_secs: default_initial_retry(),
            sweep_interval_secs: default_sweep_interval(),
            batch_size: default_batch_size(),
        }
    }
}

impl AccountingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fixed-window limiter presets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Spend-triggering actions per user per window
    #[serde(default = "default_spend_limit")]
    pub spend_limit: u32,

    #[serde(default = "default_spend_window")]
    pub spend_window_secs: u64,

    /// Registration attempts per IP per window
    #[serde(default = "default_registration_limit")]
    pub registration_limit: u32,

    #[serde(default = "default_registration_window")]
    pub registration_window_secs: u64,

    /// How often expired windows are evicted
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_spend_limit() -> u32 {
    10
}

fn default_spend_window() -> u64 {
    60
}

fn default_registration_limit() -> u32 {
    5
}

fn default_registration_window() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            spend_limit: default_spend_limit(),
            spend_window_secs: default_spend_window(),
            registration_limit: default_registration_limit(),
            registration_window_secs: default_registration_window(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl LedgerConfig {
    pub fn commission_policy(&self) -> CommissionPolicy {
        CommissionPolicy::new(self.commission.platform_fee_rate)
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<LedgerConfig, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from string
    pub fn load_str(content: &str) -> Result<LedgerConfig, ConfigError> {
        let config: LedgerConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(config: &LedgerConfig) -> Result<(), ConfigError> {
        let fee = config.commission.platform_fee_rate;
        if fee < Decimal::ZERO || fee > Decimal::ONE {
            return Err(ConfigError::Validation(format!(
                "platform_fee_rate {} outside [0, 1]",
                fee
            )));
        }

        if config.ledger.max_cas_retries == 0 {
            return Err(ConfigError::Validation(
                "max_cas_retries must be at least 1".to_string(),
            ));
        }

        let accounting = &config.accounting;
        if accounting.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "accounting.max_attempts must be at least 1".to_string(),
            ));
        }
        if accounting.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "accounting.timeout_secs must be positive".to_string(),
            ));
        }
        if accounting.sweep_interval_secs == 0 || accounting.batch_size == 0 {
            return Err(ConfigError::Validation(
                "accounting.sweep_interval_secs and batch_size must be positive".to_string(),
            ));
        }
        if let Some(endpoint) = &accounting.endpoint {
            let uri: hyper::Uri = endpoint.parse().map_err(|e| {
                ConfigError::Validation(format!("invalid accounting endpoint '{}': {}", endpoint, e))
            })?;
            if uri.scheme_str() != Some("http") || uri.host().is_none() {
                return Err(ConfigError::Validation(format!(
                    "accounting endpoint '{}' must be an absolute http:// URL",
                    endpoint
                )));
            }
        }

        let limits = &config.rate_limit;
        if limits.spend_limit == 0 || limits.spend_window_secs == 0 {
            return Err(ConfigError::Validation(
                "spend rate limit and window must be positive".to_string(),
            ));
        }
        if limits.registration_limit == 0 || limits.registration_window_secs == 0 {
            return Err(ConfigError::Validation(
                "registration rate limit and window must be positive".to_string(),
            ));
        }
        if limits.cleanup_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.cleanup_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.commission.platform_fee_rate, dec!(0.05));
        assert_eq!(config.accounting.max_attempts, 5);
        assert_eq!(config.accounting.initial_retry_secs, 60);
        assert_eq!(config.rate_limit.spend_limit, 10);
        assert_eq!(config.rate_limit.spend_window_secs, 60);
        assert!(config.accounting.endpoint.is_none());
    }

    #[test]
    fn test_parse_sections() {
        let toml = r#"
            [database]
            url = "sqlite::memory:"

            [commission]
            platform_fee_rate = "0.10"

            [accounting]
            endpoint = "http://127.0.0.1:9000/api/transactions"
            max_attempts = 3

            [rate_limit]
            spend_limit = 2
        "#;

        let config = ConfigLoader::load_str(toml).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.commission_policy().platform_fee_rate, dec!(0.10));
        assert_eq!(config.accounting.max_attempts, 3);
        assert_eq!(config.accounting.timeout(), Duration::from_secs(10));
        assert_eq!(config.rate_limit.spend_limit, 2);
        assert_eq!(config.rate_limit.registration_limit, 5);
    }

    #[test]
    fn test_rejects_fee_outside_unit_interval() {
        let err = ConfigLoader::load_str("[commission]\nplatform_fee_rate = \"1.5\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let err = ConfigLoader::load_str("[accounting]\nendpoint = \"ftp://books\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_zero_background_intervals() {
        for toml in [
            "[accounting]\nsweep_interval_secs = 0",
            "[accounting]\nbatch_size = 0",
            "[rate_limit]\ncleanup_interval_secs = 0",
        ] {
            let err = ConfigLoader::load_str(toml).unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)), "accepted {:?}", toml);
        }
        assert!(ConfigLoader::load_str("[accounting]\nsweep_interval_secs = 1\nbatch_size = 1").is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_file("/nonexistent/fanledger.toml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
