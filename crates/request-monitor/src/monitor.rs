//! The monitor façade.
//!
//! [`Monitor`] ties the pieces together: it validates configuration, owns the
//! metrics registry, installs the HTTP middleware on a router and schedules
//! dependency checkers.
//!
//! ```ignore
//! let monitor = Monitor::new(MonitorConfig::new("v1.0.0"))?;
//! monitor.add_dependency_checker(Arc::new(MyDbChecker), Duration::from_secs(30))?;
//!
//! let app = monitor.prometheus(Router::new().route("/", get(handler)));
//! ```

use axum::Router;
use http::HeaderName;
use metrics::Recorder;
use metrics_exporter_prometheus::PrometheusHandle;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::MonitorConfig;
use crate::errors::MonitorError;
use crate::middleware::http_metrics_middleware;
use crate::registry::{prometheus_recorder, MetricsRegistry, RequestLabels};
use crate::tasks::dependency_checker::spawn_dependency_checker;
use crate::tasks::{DependencyCheckHandle, DependencyChecker};

/// Decides the `isError` label from a final status code.
pub type StatusClassifier = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Default classifier: anything outside `200..400` is an error.
pub fn is_status_error(status: u16) -> bool {
    !(200..400).contains(&status)
}

/// Request instrumentation façade.
///
/// Cloning is cheap and clones share the same series and shutdown token.
#[derive(Clone)]
pub struct Monitor {
    registry: MetricsRegistry,
    prometheus: Option<PrometheusHandle>,
    error_header: HeaderName,
    version: Arc<str>,
    is_status_error: StatusClassifier,
    shutdown: CancellationToken,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("version", &self.version)
            .field("error_header", &self.error_header)
            .field("prometheus", &self.prometheus.is_some())
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Build a monitor backed by its own Prometheus recorder.
    ///
    /// Sets `application_info{version}` to 1 on success.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid (e.g., blank version).
    /// No metric is recorded in that case.
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        let recorder = prometheus_recorder(&config.buckets)?;
        let handle = recorder.handle();
        Self::build(&config, Arc::new(recorder), Some(handle))
    }

    /// Build a monitor that records into `recorder` instead.
    ///
    /// Histogram buckets are then up to the recorder, and
    /// [`render`](Self::render) returns `None`.
    pub fn with_recorder<R>(config: MonitorConfig, recorder: R) -> Result<Self, MonitorError>
    where
        R: Recorder + Send + Sync + 'static,
    {
        config.validate()?;
        Self::build(&config, Arc::new(recorder), None)
    }

    fn build(
        config: &MonitorConfig,
        recorder: Arc<dyn Recorder + Send + Sync>,
        prometheus: Option<PrometheusHandle>,
    ) -> Result<Self, MonitorError> {
        let error_header = config.error_header()?;
        let version = config.version.trim();

        let registry = MetricsRegistry::new(recorder);
        registry.set_application_info(version);

        info!(
            target: "request_monitor.monitor",
            version = %version,
            error_header = %error_header,
            buckets = ?config.buckets,
            "Request monitor initialized"
        );

        Ok(Self {
            registry,
            prometheus,
            error_header,
            version: Arc::from(version),
            is_status_error: Arc::new(is_status_error),
            shutdown: CancellationToken::new(),
        })
    }

    /// Replace the `isError` classifier.
    ///
    /// Clones taken before this call keep the previous classifier.
    #[must_use]
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.is_status_error = Arc::new(classifier);
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Header read into the `errorMessage` label.
    pub fn error_header(&self) -> &HeaderName {
        &self.error_header
    }

    pub fn is_error(&self, status: u16) -> bool {
        (self.is_status_error)(status)
    }

    /// Handle for serving the scrape endpoint, if Prometheus-backed.
    pub fn prometheus_handle(&self) -> Option<&PrometheusHandle> {
        self.prometheus.as_ref()
    }

    /// Prometheus text exposition of every series, if Prometheus-backed.
    pub fn render(&self) -> Option<String> {
        self.prometheus.as_ref().map(PrometheusHandle::render)
    }

    /// Instrument every route currently on `router`.
    ///
    /// Add routes (and fallback) first, then call this, so the middleware
    /// sees the matched route template.
    pub fn prometheus<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            http_metrics_middleware,
        ))
    }

    /// Record the two per-request observations.
    pub(crate) fn record_request(&self, labels: &RequestLabels, elapsed: Duration, bytes: u64) {
        self.registry.observe_request(labels, elapsed);
        self.registry.add_response_size(labels, bytes);
    }

    /// Record one observation of a call made to a dependency.
    ///
    /// Metric: `dependency_request_seconds`
    ///
    /// Pure pass-through: every label is supplied by the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn collect_dependency_time(
        &self,
        name: &str,
        protocol: &str,
        status: &str,
        method: &str,
        route: &str,
        is_error: &str,
        error_message: &str,
        seconds: f64,
    ) {
        let labels = RequestLabels {
            protocol: protocol.to_owned(),
            status: status.to_owned(),
            method: method.to_owned(),
            route: route.to_owned(),
            is_error: is_error.to_owned(),
            error_message: error_message.to_owned(),
        };
        self.registry.observe_dependency_request(name, &labels, seconds);
    }

    /// Structured variant of [`collect_dependency_time`](Self::collect_dependency_time).
    pub fn record_dependency_request(&self, name: &str, labels: &RequestLabels, duration: Duration) {
        self.registry
            .observe_dependency_request(name, labels, duration.as_secs_f64());
    }

    /// Poll `checker` every `period` and publish `dependency_up{name}`.
    ///
    /// Each checker runs in its own task until the returned handle is
    /// cancelled or [`shutdown`](Self::shutdown) is called.
    ///
    /// # Errors
    ///
    /// Returns error if `period` is zero or no tokio runtime is running.
    pub fn add_dependency_checker(
        &self,
        checker: Arc<dyn DependencyChecker>,
        period: Duration,
    ) -> Result<DependencyCheckHandle, MonitorError> {
        spawn_dependency_checker(
            self.registry.clone(),
            checker,
            period,
            self.shutdown.child_token(),
        )
    }

    /// Stop every dependency checker started from this monitor or its clones.
    pub fn shutdown(&self) {
        info!(target: "request_monitor.monitor", "Stopping dependency checkers");
        self.shutdown.cancel();
    }
}
