//! Config - 起動時設定（TOML）
//!
//! 起動時に一度だけ読み込み、値として builder に渡す。
//! 実行中の再設定はしない。

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::app::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// LauncherConfig はランチャーの設定
///
/// 未指定の項目はデフォルト値になる（`#[serde(default)]`）。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Number of launcher tasks that may run at once, cluster-wide.
    pub worker_pool_size: usize,
    /// Per-call timeout for node agent calls (milliseconds).
    pub call_timeout_ms: u64,
    /// Total `start_container` calls allowed per LAUNCH on transient errors.
    pub max_launch_attempts: u32,
    /// Total `stop_container` calls allowed per CLEANUP on transient errors.
    pub max_cleanup_attempts: u32,
    /// Delay before the first retry (milliseconds).
    pub retry_base_delay_ms: u64,
    /// Backoff multiplier applied per retry.
    pub retry_multiplier: f64,
    /// Upper bound for a single backoff delay (milliseconds).
    pub retry_max_delay_ms: u64,
    /// How long `shutdown` waits for in-flight tasks before cancelling.
    pub shutdown_grace_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 10,
            call_timeout_ms: 10_000,
            max_launch_attempts: 3,
            max_cleanup_attempts: 3,
            retry_base_delay_ms: 500,
            retry_multiplier: 2.0,
            retry_max_delay_ms: 5_000,
            shutdown_grace_ms: 30_000,
            logging: LoggingConfig::default(),
        }
    }
}

impl LauncherConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid("worker_pool_size must be > 0".into()));
        }
        if self.worker_pool_size > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "worker_pool_size must be <= {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.max_launch_attempts == 0 || self.max_cleanup_attempts == 0 {
            return Err(ConfigError::Invalid("attempt budgets must be > 0".into()));
        }
        if !(self.retry_multiplier.is_finite() && self.retry_multiplier >= 1.0) {
            return Err(ConfigError::Invalid("retry_multiplier must be >= 1.0".into()));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: self.retry_multiplier,
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

/// Logging settings. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = LauncherConfig::from_toml_str("").unwrap();
        assert_eq!(config, LauncherConfig::default());
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let config = LauncherConfig::from_toml_str(
            r#"
            worker_pool_size = 4
            max_launch_attempts = 5

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.worker_pool_size, 4);
        assert_eq!(config.max_launch_attempts, 5);
        assert_eq!(config.max_cleanup_attempts, 3);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn zero_pool_is_rejected() {
        let err = LauncherConfig::from_toml_str("worker_pool_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn pool_beyond_semaphore_limit_is_rejected() {
        let config = LauncherConfig {
            worker_pool_size: Semaphore::MAX_PERMITS + 1,
            ..LauncherConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = LauncherConfig {
            worker_pool_size: Semaphore::MAX_PERMITS,
            ..LauncherConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = LauncherConfig::from_toml_str("worker_pool_size = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = LauncherConfig::load("/nonexistent/amlauncher.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
