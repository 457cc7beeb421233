//! Request Monitor
//!
//! HTTP request instrumentation for axum services. Wraps a router and
//! records, per request, latency and response size labelled by protocol,
//! status, method, route template, error classification and error message.
//! Also exports the deployed application version and the liveness of
//! dependencies polled in the background.
//!
//! # Architecture
//!
//! ```text
//! Monitor ──┬── middleware::http_metrics ── interceptor (status, bytes, elapsed)
//!           ├── registry (series, labels) ── metrics::Recorder
//!           └── tasks::dependency_checker (one task per checker)
//! ```
//!
//! # Modules
//!
//! - `config` - Monitor configuration (code, environment or serde)
//! - `errors` - Setup-time error types
//! - `interceptor` - Response status/size/latency capture
//! - `middleware` - axum middleware recording request metrics
//! - `monitor` - The `Monitor` façade
//! - `registry` - Metric names, label sets and Prometheus recorder
//! - `tasks` - Dependency checker background tasks

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod config;
pub mod errors;
pub mod interceptor;
pub mod middleware;
pub mod monitor;
pub mod registry;
pub mod tasks;

/// Metric assertion helpers (`test-utils` feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{MonitorConfig, DEFAULT_BUCKETS, DEFAULT_ERROR_MESSAGE_KEY};
pub use errors::MonitorError;
pub use interceptor::{ResponseInterceptor, DEFAULT_STATUS};
pub use monitor::{is_status_error, Monitor, StatusClassifier};
pub use registry::RequestLabels;
pub use tasks::{DependencyCheckHandle, DependencyChecker, DependencyStatus};
