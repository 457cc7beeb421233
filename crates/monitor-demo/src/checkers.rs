//! Dependency checkers used by the demo.

use async_trait::async_trait;
use request_monitor::{DependencyChecker, DependencyStatus};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Reports a dependency up when a TCP connection to it can be opened
/// within the timeout.
#[derive(Debug, Clone)]
pub struct TcpDependencyChecker {
    name: String,
    address: String,
    timeout: Duration,
}

impl TcpDependencyChecker {
    pub fn new(name: impl Into<String>, address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DependencyChecker for TcpDependencyChecker {
    fn dependency_name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> DependencyStatus {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => DependencyStatus::Up,
            Ok(Err(e)) => {
                debug!(
                    target: "monitor_demo.checkers",
                    dependency = %self.name,
                    address = %self.address,
                    error = %e,
                    "Dependency connect failed"
                );
                DependencyStatus::Down
            }
            Err(_) => {
                debug!(
                    target: "monitor_demo.checkers",
                    dependency = %self.name,
                    address = %self.address,
                    timeout_ms = self.timeout.as_millis(),
                    "Dependency connect timed out"
                );
                DependencyStatus::Down
            }
        }
    }
}

/// Always reports the same status. Stands in when no address is configured.
#[derive(Debug, Clone)]
pub struct StaticDependencyChecker {
    name: String,
    status: DependencyStatus,
}

impl StaticDependencyChecker {
    pub fn new(name: impl Into<String>, status: DependencyStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

#[async_trait]
impl DependencyChecker for StaticDependencyChecker {
    fn dependency_name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> DependencyStatus {
        self.status
    }
}
