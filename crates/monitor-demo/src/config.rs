//! Demo service configuration.
//!
//! Loaded from environment variables. Monitor settings (`APP_VERSION`,
//! `MONITOR_ERROR_HEADER`, `MONITOR_BUCKETS`) are delegated to
//! [`MonitorConfig::from_vars`].

use request_monitor::config::ConfigError as MonitorConfigError;
use request_monitor::MonitorConfig;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default name reported in `dependency_up{name}`.
pub const DEFAULT_DEPENDENCY_NAME: &str = "upstream";

/// Default dependency checking period in seconds.
pub const DEFAULT_DEPENDENCY_CHECK_SECONDS: u64 = 30;

/// Default TCP connect timeout for the dependency check in milliseconds.
pub const DEFAULT_DEPENDENCY_TIMEOUT_MS: u64 = 1000;

/// Demo service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    pub monitor: MonitorConfig,

    /// Name of the polled dependency.
    pub dependency_name: String,

    /// TCP `host:port` probed by the dependency checker.
    /// When unset, the dependency is always reported down.
    pub dependency_address: Option<String>,

    pub dependency_check_period: Duration,

    pub dependency_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("version", &self.monitor.version)
            .field("error_message_key", &self.monitor.error_message_key)
            .field("buckets", &self.monitor.buckets)
            .field("dependency_name", &self.dependency_name)
            .field("dependency_address", &self.dependency_address)
            .field("dependency_check_period", &self.dependency_check_period)
            .field("dependency_timeout", &self.dependency_timeout)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Monitor configuration error: {0}")]
    Monitor(#[from] MonitorConfigError),

    #[error("Invalid dependency check period: {0}")]
    InvalidCheckPeriod(String),

    #[error("Invalid dependency timeout: {0}")]
    InvalidTimeout(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let monitor = MonitorConfig::from_vars(vars)?;
        monitor.validate()?;

        let dependency_name = vars
            .get("DEPENDENCY_NAME")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_DEPENDENCY_NAME.to_string());

        let dependency_address = vars
            .get("DEPENDENCY_ADDRESS")
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty());

        let check_seconds = if let Some(value_str) = vars.get("DEPENDENCY_CHECK_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidCheckPeriod(format!(
                    "DEPENDENCY_CHECK_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCheckPeriod(
                    "DEPENDENCY_CHECK_SECONDS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_DEPENDENCY_CHECK_SECONDS
        };

        let timeout_ms = if let Some(value_str) = vars.get("DEPENDENCY_TIMEOUT_MS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTimeout(format!(
                    "DEPENDENCY_TIMEOUT_MS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidTimeout(
                    "DEPENDENCY_TIMEOUT_MS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_DEPENDENCY_TIMEOUT_MS
        };

        Ok(Config {
            bind_address,
            monitor,
            dependency_name,
            dependency_address,
            dependency_check_period: Duration::from_secs(check_seconds),
            dependency_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("APP_VERSION".to_string(), "v1.0.0".to_string())])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&base_vars()).expect("config should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.monitor, MonitorConfig::new("v1.0.0"));
        assert_eq!(config.dependency_name, DEFAULT_DEPENDENCY_NAME);
        assert_eq!(config.dependency_address, None);
        assert_eq!(config.dependency_check_period, Duration::from_secs(30));
        assert_eq!(config.dependency_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("MONITOR_ERROR_HEADER".to_string(), "x-error".to_string());
        vars.insert("MONITOR_BUCKETS".to_string(), "0.5, 1, 5".to_string());
        vars.insert("DEPENDENCY_NAME".to_string(), "postgres".to_string());
        vars.insert("DEPENDENCY_ADDRESS".to_string(), "db:5432".to_string());
        vars.insert("DEPENDENCY_CHECK_SECONDS".to_string(), "5".to_string());
        vars.insert("DEPENDENCY_TIMEOUT_MS".to_string(), "250".to_string());

        let config = Config::from_vars(&vars).expect("config should load");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.monitor.error_message_key, "x-error");
        assert_eq!(config.monitor.buckets, vec![0.5, 1.0, 5.0]);
        assert_eq!(config.dependency_name, "postgres");
        assert_eq!(config.dependency_address.as_deref(), Some("db:5432"));
        assert_eq!(config.dependency_check_period, Duration::from_secs(5));
        assert_eq!(config.dependency_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_version_rejected() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(
            result,
            Err(ConfigError::Monitor(MonitorConfigError::BlankVersion))
        ));
    }

    #[test]
    fn test_zero_check_period_rejected() {
        let mut vars = base_vars();
        vars.insert("DEPENDENCY_CHECK_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidCheckPeriod(_))));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let mut vars = base_vars();
        vars.insert("DEPENDENCY_TIMEOUT_MS".to_string(), "soon".to_string());

        let result = Config::from_vars(&vars);
        match result {
            Err(ConfigError::InvalidTimeout(msg)) => {
                assert!(msg.contains("soon"));
            }
            other => panic!("expected InvalidTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_dependency_address_is_unset() {
        let mut vars = base_vars();
        vars.insert("DEPENDENCY_ADDRESS".to_string(), "  ".to_string());

        let config = Config::from_vars(&vars).expect("config should load");
        assert_eq!(config.dependency_address, None);
    }
}
