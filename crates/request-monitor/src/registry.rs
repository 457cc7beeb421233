//! Metrics registry adapter.
//!
//! Owns the five series the monitor exposes and records into them through a
//! [`metrics::Recorder`]. Storage, label-set lookup, histogram math and the
//! exposition format all belong to the recorder; this module only decides
//! names, labels and when to record.
//!
//! # Series
//!
//! | Name | Kind | Labels |
//! |---|---|---|
//! | `request_seconds` | histogram | protocol, status, method, route, isError, errorMessage |
//! | `response_size_bytes` | counter | protocol, status, method, route, isError, errorMessage |
//! | `dependency_up` | gauge | name |
//! | `dependency_request_seconds` | histogram | name + the six request labels |
//! | `application_info` | gauge | version |
//!
//! Names and label keys are kept wire-compatible with existing dashboards.

use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusRecorder};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::MonitorError;
use crate::tasks::DependencyStatus;

pub const REQUEST_SECONDS: &str = "request_seconds";
pub const RESPONSE_SIZE_BYTES: &str = "response_size_bytes";
pub const DEPENDENCY_UP: &str = "dependency_up";
pub const DEPENDENCY_REQUEST_SECONDS: &str = "dependency_request_seconds";
pub const APPLICATION_INFO: &str = "application_info";

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// The six labels attached to every request observation.
///
/// All fields are always present; "unknown" values are empty strings, never
/// missing labels, so every series for a metric has the same label keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLabels {
    /// HTTP version of the request, e.g. `HTTP/1.1`.
    pub protocol: String,
    /// Decimal status code, e.g. `404`.
    pub status: String,
    pub method: String,
    /// Normalized route template (`/users/:id`), empty when unmatched.
    pub route: String,
    /// `"true"` or `"false"`.
    pub is_error: String,
    pub error_message: String,
}

impl RequestLabels {
    fn to_labels(&self) -> Vec<Label> {
        vec![
            Label::new("protocol", self.protocol.clone()),
            Label::new("status", self.status.clone()),
            Label::new("method", self.method.clone()),
            Label::new("route", self.route.clone()),
            Label::new("isError", self.is_error.clone()),
            Label::new("errorMessage", self.error_message.clone()),
        ]
    }
}

/// Records the monitor's series into a shared recorder.
///
/// Cloning is cheap; clones record into the same recorder.
#[derive(Clone)]
pub struct MetricsRegistry {
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    /// Wraps `recorder` and publishes the help text for every series.
    pub fn new(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        let registry = Self { recorder };
        registry.describe();
        registry
    }

    fn describe(&self) {
        self.recorder.describe_histogram(
            KeyName::from_const_str(REQUEST_SECONDS),
            None,
            SharedString::const_str("Duration in seconds of HTTP requests."),
        );
        self.recorder.describe_counter(
            KeyName::from_const_str(RESPONSE_SIZE_BYTES),
            None,
            SharedString::const_str("Counts the size of each HTTP response"),
        );
        self.recorder.describe_gauge(
            KeyName::from_const_str(DEPENDENCY_UP),
            None,
            SharedString::const_str("Records if a dependency is up or down. 1 for up, 0 for down"),
        );
        self.recorder.describe_histogram(
            KeyName::from_const_str(DEPENDENCY_REQUEST_SECONDS),
            None,
            SharedString::const_str("Duration of dependency requests in seconds."),
        );
        self.recorder.describe_gauge(
            KeyName::from_const_str(APPLICATION_INFO),
            None,
            SharedString::const_str("Static information about the application"),
        );
    }

    /// Metric: `request_seconds`
    pub fn observe_request(&self, labels: &RequestLabels, duration: Duration) {
        let key = Key::from_parts(REQUEST_SECONDS, labels.to_labels());
        self.recorder
            .register_histogram(&key, &METADATA)
            .record(duration.as_secs_f64());
    }

    /// Metric: `response_size_bytes`
    pub fn add_response_size(&self, labels: &RequestLabels, bytes: u64) {
        let key = Key::from_parts(RESPONSE_SIZE_BYTES, labels.to_labels());
        self.recorder.register_counter(&key, &METADATA).increment(bytes);
    }

    /// Metric: `dependency_up` (1 for up, 0 for down)
    pub fn set_dependency_up(&self, name: &str, status: DependencyStatus) {
        let key = Key::from_parts(DEPENDENCY_UP, vec![Label::new("name", name.to_owned())]);
        self.recorder
            .register_gauge(&key, &METADATA)
            .set(status.as_gauge_value());
    }

    /// Metric: `dependency_request_seconds`
    pub fn observe_dependency_request(&self, name: &str, labels: &RequestLabels, seconds: f64) {
        let mut key_labels = Vec::with_capacity(7);
        key_labels.push(Label::new("name", name.to_owned()));
        key_labels.extend(labels.to_labels());

        let key = Key::from_parts(DEPENDENCY_REQUEST_SECONDS, key_labels);
        self.recorder.register_histogram(&key, &METADATA).record(seconds);
    }

    /// Metric: `application_info`
    pub fn set_application_info(&self, version: &str) {
        let key = Key::from_parts(
            APPLICATION_INFO,
            vec![Label::new("version", version.to_owned())],
        );
        self.recorder.register_gauge(&key, &METADATA).set(1.0);
    }
}

/// Build a Prometheus recorder with `buckets` applied to both histograms.
///
/// The recorder is not installed globally; the caller owns it and renders
/// through its handle.
///
/// # Errors
///
/// Returns error if the exporter rejects the buckets (e.g., empty).
pub fn prometheus_recorder(buckets: &[f64]) -> Result<PrometheusRecorder, MonitorError> {
    let recorder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_SECONDS.to_string()), buckets)
        .map_err(|e| MonitorError::Exporter(format!("Failed to set request buckets: {e}")))?
        .set_buckets_for_metric(
            Matcher::Full(DEPENDENCY_REQUEST_SECONDS.to_string()),
            buckets,
        )
        .map_err(|e| {
            MonitorError::Exporter(format!("Failed to set dependency request buckets: {e}"))
        })?
        .build_recorder();

    Ok(recorder)
}
