//! Dependency liveness checker background task.
//!
//! Each registered [`DependencyChecker`] gets its own task that calls
//! `check()` on a fixed interval and writes the result to
//! `dependency_up{name}`.
//!
//! # Scheduling
//!
//! The first check runs immediately. Checks are awaited inline, so a checker
//! never has two checks in flight; if a check outlasts the period, the missed
//! ticks are skipped rather than replayed in a burst.
//!
//! # Failure policy
//!
//! A panic inside `check()` is caught, logged and recorded as
//! [`DependencyStatus::Down`]. The task keeps running.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token fires, including while a check
//! is still pending.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::errors::MonitorError;
use crate::registry::MetricsRegistry;

/// Liveness of a dependency, written to the gauge as `Up = 1`, `Down = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyStatus {
    Down = 0,
    Up = 1,
}

impl DependencyStatus {
    pub fn as_gauge_value(self) -> f64 {
        match self {
            DependencyStatus::Down => 0.0,
            DependencyStatus::Up => 1.0,
        }
    }

    pub fn is_up(self) -> bool {
        self == DependencyStatus::Up
    }
}

impl From<bool> for DependencyStatus {
    fn from(up: bool) -> Self {
        if up {
            DependencyStatus::Up
        } else {
            DependencyStatus::Down
        }
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyStatus::Down => f.write_str("DOWN"),
            DependencyStatus::Up => f.write_str("UP"),
        }
    }
}

/// A downstream service whose liveness the monitor samples.
///
/// Implementations are supplied by the embedding application; the monitor
/// only schedules them.
#[async_trait]
pub trait DependencyChecker: Send + Sync {
    /// Value of the `name` label on `dependency_up`.
    fn dependency_name(&self) -> &str;

    async fn check(&self) -> DependencyStatus;
}

/// Handle to a running dependency checker task.
///
/// Dropping the handle does not stop the task; call [`cancel`](Self::cancel)
/// or shut the monitor down.
#[derive(Debug)]
pub struct DependencyCheckHandle {
    dependency_name: String,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl DependencyCheckHandle {
    pub fn dependency_name(&self) -> &str {
        &self.dependency_name
    }

    /// Stops the task after its current tick.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            warn!(
                target: "request_monitor.dependency",
                dependency = %self.dependency_name,
                error = %e,
                "Dependency checker task ended abnormally"
            );
        }
    }
}

/// Spawn a checker task on the current tokio runtime.
pub(crate) fn spawn_dependency_checker(
    registry: MetricsRegistry,
    checker: Arc<dyn DependencyChecker>,
    period: Duration,
    cancel_token: CancellationToken,
) -> Result<DependencyCheckHandle, MonitorError> {
    if period.is_zero() {
        return Err(MonitorError::InvalidCheckPeriod);
    }
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

    let dependency_name = checker.dependency_name().to_owned();
    info!(
        target: "request_monitor.dependency",
        dependency = %dependency_name,
        period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
        "Dependency checker starting"
    );

    let span = tracing::info_span!("request_monitor.dependency_checker", dependency = %dependency_name);
    let task = runtime.spawn(
        run_dependency_checker(registry, checker, period, cancel_token.clone()).instrument(span),
    );

    Ok(DependencyCheckHandle {
        dependency_name,
        cancel_token,
        task,
    })
}

/// Run the checker loop until `cancel_token` fires.
///
/// # Arguments
///
/// * `registry` - Where `dependency_up` is recorded
/// * `checker` - The dependency to poll
/// * `period` - Interval between checks; must be non-zero
/// * `cancel_token` - Token for graceful shutdown
pub async fn run_dependency_checker(
    registry: MetricsRegistry,
    checker: Arc<dyn DependencyChecker>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let name = checker.dependency_name().to_owned();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_status: Option<DependencyStatus> = None;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let status = tokio::select! {
            () = cancel_token.cancelled() => break,
            status = check_once(checker.as_ref(), &name) => status,
        };

        registry.set_dependency_up(&name, status);

        if last_status == Some(status) {
            debug!(target: "request_monitor.dependency", dependency = %name, %status, "Dependency checked");
        } else {
            match status {
                DependencyStatus::Up => {
                    info!(target: "request_monitor.dependency", dependency = %name, "Dependency is UP");
                }
                DependencyStatus::Down => {
                    warn!(target: "request_monitor.dependency", dependency = %name, "Dependency is DOWN");
                }
            }
            last_status = Some(status);
        }
    }

    info!(
        target: "request_monitor.dependency",
        dependency = %name,
        "Dependency checker received shutdown signal, exiting"
    );
}

/// One check with panic isolation.
async fn check_once(checker: &dyn DependencyChecker, name: &str) -> DependencyStatus {
    match AssertUnwindSafe(checker.check()).catch_unwind().await {
        Ok(status) => status,
        Err(payload) => {
            error!(
                target: "request_monitor.dependency",
                dependency = %name,
                panic_message = %panic_message(payload.as_ref()),
                "Dependency check panicked, reporting DOWN"
            );
            DependencyStatus::Down
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::registry::DEPENDENCY_UP;
    use crate::testing::MetricCapture;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const PERIOD: Duration = Duration::from_secs(30);

    struct SwitchChecker {
        up: AtomicBool,
        calls: AtomicUsize,
    }

    impl SwitchChecker {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(Self {
                up: AtomicBool::new(up),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DependencyChecker for SwitchChecker {
        fn dependency_name(&self) -> &str {
            "postgres"
        }

        async fn check(&self) -> DependencyStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DependencyStatus::from(self.up.load(Ordering::SeqCst))
        }
    }

    struct PanickingChecker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DependencyChecker for PanickingChecker {
        fn dependency_name(&self) -> &str {
            "flaky"
        }

        async fn check(&self) -> DependencyStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("connection pool poisoned");
        }
    }

    struct SlowChecker {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DependencyChecker for SlowChecker {
        fn dependency_name(&self) -> &str {
            "slow"
        }

        async fn check(&self) -> DependencyStatus {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(PERIOD * 3).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            DependencyStatus::Up
        }
    }

    /// Let spawned tasks run after a time advance.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn spawn(
        registry: &MetricsRegistry,
        checker: Arc<dyn DependencyChecker>,
    ) -> DependencyCheckHandle {
        spawn_dependency_checker(registry.clone(), checker, PERIOD, CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_status_encoding() {
        assert_eq!(DependencyStatus::Up.as_gauge_value(), 1.0);
        assert_eq!(DependencyStatus::Down.as_gauge_value(), 0.0);
        assert_eq!(DependencyStatus::Up as i32, 1);
        assert_eq!(DependencyStatus::Down as i32, 0);
        assert_eq!(DependencyStatus::Up.to_string(), "UP");
        assert!(!DependencyStatus::from(false).is_up());
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let (_capture, recorder) = MetricCapture::new();
        let registry = MetricsRegistry::new(Arc::new(recorder));

        let result = spawn_dependency_checker(
            registry,
            SwitchChecker::new(true),
            PERIOD,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(MonitorError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let (_capture, recorder) = MetricCapture::new();
        let registry = MetricsRegistry::new(Arc::new(recorder));

        let result = spawn_dependency_checker(
            registry,
            SwitchChecker::new(true),
            Duration::ZERO,
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(MonitorError::InvalidCheckPeriod)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gauge_follows_checker_each_period() {
        let (capture, recorder) = MetricCapture::new();
        let registry = MetricsRegistry::new(Arc::new(recorder));
        let checker = SwitchChecker::new(true);

        let handle = spawn(&registry, checker.clone());
        assert_eq!(handle.dependency_name(), "postgres");

        // First check runs immediately
        tokio::time::advance(Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(
            capture.snapshot().gauge(DEPENDENCY_UP, &[("name", "postgres")]),
            Some(1.0)
        );

        // Flip to DOWN; the gauge only changes on the next tick
        checker.up.store(false, Ordering::SeqCst);
        tokio::time::advance(PERIOD / 2).await;
        settle().await;
        assert_eq!(
            capture.snapshot().gauge(DEPENDENCY_UP, &[("name", "postgres")]),
            Some(1.0)
        );

        tokio::time::advance(PERIOD / 2).await;
        settle().await;
        assert_eq!(
            capture.snapshot().gauge(DEPENDENCY_UP, &[("name", "postgres")]),
            Some(0.0)
        );
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_check_reports_down_and_keeps_running() {
        let (capture, recorder) = MetricCapture::new();
        let registry = MetricsRegistry::new(Arc::new(recorder));
        let checker = Arc::new(PanickingChecker {
            calls: AtomicUsize::new(0),
        });

        let handle = spawn(&registry, checker.clone());

        tokio::time::advance(Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(
            capture.snapshot().gauge(DEPENDENCY_UP, &[("name", "flaky")]),
            Some(0.0)
        );

        tokio::time::advance(PERIOD).await;
        settle().await;
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_checks_never_overlap() {
        let (_capture, recorder) = MetricCapture::new();
        let registry = MetricsRegistry::new(Arc::new(recorder));
        let checker = Arc::new(SlowChecker {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });

        let handle = spawn(&registry, checker.clone());

        for _ in 0..10 {
            tokio::time::advance(PERIOD).await;
            settle().await;
        }

        assert_eq!(checker.max_in_flight.load(Ordering::SeqCst), 1);
        // Each check takes three periods; skipped ticks are not replayed.
        let calls = checker.calls.load(Ordering::SeqCst);
        assert!((3..=5).contains(&calls), "unexpected call count {calls}");

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_checks() {
        let (_capture, recorder) = MetricCapture::new();
        let registry = MetricsRegistry::new(Arc::new(recorder));
        let checker = SwitchChecker::new(true);

        let handle = spawn(&registry, checker.clone());
        tokio::time::advance(Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);

        handle.cancel();
        assert!(handle.is_cancelled());
        settle().await;
        assert!(handle.is_finished());

        tokio::time::advance(PERIOD * 5).await;
        settle().await;
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pending_check() {
        let (_capture, recorder) = MetricCapture::new();
        let registry = MetricsRegistry::new(Arc::new(recorder));
        let checker = Arc::new(SlowChecker {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });

        let handle = spawn(&registry, checker.clone());
        tokio::time::advance(Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(checker.in_flight.load(Ordering::SeqCst), 1);

        handle.shutdown().await;
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
    }
}
