//! Monitor Demo
//!
//! Small axum service instrumented with `request-monitor`. Serves a few
//! sample routes, exposes `/metrics` and polls one dependency.

mod checkers;
mod config;
mod routes;

use checkers::{StaticDependencyChecker, TcpDependencyChecker};
use config::Config;
use request_monitor::{DependencyChecker, DependencyStatus, Monitor};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "monitor_demo=debug,request_monitor=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Monitor Demo");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        version = %config.monitor.version,
        dependency = %config.dependency_name,
        check_period_secs = config.dependency_check_period.as_secs(),
        "Configuration loaded successfully"
    );

    let monitor = Monitor::new(config.monitor.clone()).map_err(|e| {
        error!("Failed to initialize request monitor: {}", e);
        e
    })?;

    let checker: Arc<dyn DependencyChecker> = match &config.dependency_address {
        Some(address) => Arc::new(TcpDependencyChecker::new(
            config.dependency_name.clone(),
            address.clone(),
            config.dependency_timeout,
        )),
        None => {
            info!(
                dependency = %config.dependency_name,
                "No DEPENDENCY_ADDRESS set, dependency will be reported down"
            );
            Arc::new(StaticDependencyChecker::new(
                config.dependency_name.clone(),
                DependencyStatus::Down,
            ))
        }
    };
    let dependency_task = monitor.add_dependency_checker(checker, config.dependency_check_period)?;

    let app = routes::build_routes(monitor.clone());

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Monitor Demo listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.shutdown();
    dependency_task.shutdown().await;

    info!("Monitor Demo shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
