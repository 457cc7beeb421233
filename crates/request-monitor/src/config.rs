//! Monitor configuration.
//!
//! Configuration is an explicit value handed to [`Monitor::new`](crate::Monitor::new);
//! there is no process-wide default registry or bucket list to mutate.
//! It can be built in code, loaded from environment variables, or
//! deserialized as part of a larger application config.

use http::HeaderName;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Header used to carry an error message into the `errorMessage` label.
pub const DEFAULT_ERROR_MESSAGE_KEY: &str = "error-message";

/// Histogram bucket upper bounds, in seconds, used when none are configured.
pub const DEFAULT_BUCKETS: [f64; 4] = [0.1, 0.3, 1.5, 10.5];

/// Environment variable holding the application version (required).
pub const ENV_APP_VERSION: &str = "APP_VERSION";

/// Environment variable overriding the error message header name.
pub const ENV_ERROR_HEADER: &str = "MONITOR_ERROR_HEADER";

/// Environment variable overriding the histogram buckets (comma-separated).
pub const ENV_BUCKETS: &str = "MONITOR_BUCKETS";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("application version must be a non-empty string")]
    BlankVersion,

    #[error("Invalid error message header: {0}")]
    InvalidErrorHeader(String),

    #[error("Invalid histogram buckets: {0}")]
    InvalidBuckets(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnvVar(String),
}

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonitorConfig {
    /// Deployed application version, exported as `application_info{version}`.
    pub version: String,

    /// Header carrying the `errorMessage` label value.
    /// A blank key falls back to [`DEFAULT_ERROR_MESSAGE_KEY`].
    #[serde(default = "default_error_message_key")]
    pub error_message_key: String,

    /// Upper bounds shared by `request_seconds` and `dependency_request_seconds`.
    #[serde(default = "default_buckets")]
    pub buckets: Vec<f64>,
}

fn default_error_message_key() -> String {
    DEFAULT_ERROR_MESSAGE_KEY.to_string()
}

fn default_buckets() -> Vec<f64> {
    DEFAULT_BUCKETS.to_vec()
}

impl MonitorConfig {
    /// Configuration for `version` with the default header key and buckets.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            error_message_key: default_error_message_key(),
            buckets: default_buckets(),
        }
    }

    /// Sets the error message header key.
    #[must_use]
    pub fn with_error_message_key(mut self, key: impl Into<String>) -> Self {
        self.error_message_key = key.into();
        self
    }

    /// Sets the histogram buckets. `None` restores the defaults.
    #[must_use]
    pub fn with_buckets(mut self, buckets: Option<Vec<f64>>) -> Self {
        self.buckets = buckets.unwrap_or_else(default_buckets);
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// A missing `APP_VERSION` is not an error here; it surfaces as
    /// [`ConfigError::BlankVersion`] from [`validate`](Self::validate) so the
    /// caller sees a single failure mode for "no version".
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let version = vars.get(ENV_APP_VERSION).cloned().unwrap_or_default();

        let error_message_key = vars
            .get(ENV_ERROR_HEADER)
            .cloned()
            .unwrap_or_else(default_error_message_key);

        let buckets = match vars.get(ENV_BUCKETS) {
            Some(value) => Some(parse_buckets(value).map_err(|e| {
                ConfigError::InvalidEnvVar(format!("{ENV_BUCKETS}: {e}"))
            })?),
            None => None,
        };

        Ok(Self::new(version)
            .with_error_message_key(error_message_key)
            .with_buckets(buckets))
    }

    /// Validate the configuration without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::BlankVersion);
        }
        self.error_header()?;
        validate_buckets(&self.buckets)
    }

    /// The error message header, falling back to the default for a blank key.
    pub fn error_header(&self) -> Result<HeaderName, ConfigError> {
        let key = self.error_message_key.trim();
        let key = if key.is_empty() {
            DEFAULT_ERROR_MESSAGE_KEY
        } else {
            key
        };

        HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ConfigError::InvalidErrorHeader(format!("'{key}': {e}")))
    }
}

/// Parse a comma-separated bucket list such as `"0.1, 0.3,1.5"`.
fn parse_buckets(value: &str) -> Result<Vec<f64>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>()
                .map_err(|e| format!("'{part}' is not a number: {e}"))
        })
        .collect()
}

/// Buckets must be non-empty, finite, non-negative and strictly ascending.
fn validate_buckets(buckets: &[f64]) -> Result<(), ConfigError> {
    if buckets.is_empty() {
        return Err(ConfigError::InvalidBuckets(
            "at least one bucket is required".to_string(),
        ));
    }

    if let Some(bad) = buckets.iter().find(|b| !b.is_finite() || **b < 0.0) {
        return Err(ConfigError::InvalidBuckets(format!(
            "bucket bounds must be finite and non-negative, got {bad}"
        )));
    }

    if let Some(pair) = buckets.windows(2).find(|w| matches!(w, [a, b] if a >= b)) {
        return Err(ConfigError::InvalidBuckets(format!(
            "bucket bounds must be strictly ascending, got {pair:?}"
        )));
    }

    Ok(())
}
