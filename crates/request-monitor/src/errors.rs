//! Request monitor error types.
//!
//! Every error here is raised synchronously at setup time: building the
//! monitor or registering a dependency checker. The per-request path has no
//! error type because it cannot fail.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by [`Monitor`](crate::Monitor) construction and
/// dependency scheduling.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The supplied configuration failed validation.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The Prometheus exporter rejected the histogram configuration.
    #[error("Metrics exporter error: {0}")]
    Exporter(String),

    /// A dependency checker was registered with a zero checking period.
    #[error("Dependency checking period must be greater than zero")]
    InvalidCheckPeriod,

    /// A dependency checker was registered outside of a tokio runtime.
    #[error("Dependency checkers require a running tokio runtime")]
    NoRuntime,
}

/// Result type alias using `MonitorError`
pub type Result<T> = std::result::Result<T, MonitorError>;
