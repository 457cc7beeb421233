//! HTTP routes for the demo service.
//!
//! Every route, `/metrics` included, goes through the request monitor.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use request_monitor::Monitor;
use tower_http::trace::TraceLayer;

/// Build the application routes.
///
/// - `/` - Greeting
/// - `/users/:id` - Recorded under its route template
/// - `/fail` - 500 with an error message for the `errorMessage` label
/// - `/metrics` - Prometheus exposition
pub fn build_routes(monitor: Monitor) -> Router {
    let routes = Router::new()
        .route("/", get(root))
        .route("/users/:id", get(user))
        .route("/fail", get(fail))
        .route("/metrics", get(metrics_handler))
        .with_state(monitor.clone());

    // Layer order (bottom-to-top execution):
    // 1. Request monitor - sees the matched route
    // 2. TraceLayer - Log request details
    monitor
        .prometheus(routes)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> &'static str {
    "request-monitor!\n"
}

async fn user(Path(id): Path<String>) -> String {
    format!("user {id}\n")
}

async fn fail(State(monitor): State<Monitor>) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(monitor.error_header().clone(), "simulated failure")],
        "internal error\n",
    )
}

/// Handler for GET /metrics
#[tracing::instrument(skip_all, name = "demo.metrics.scrape")]
async fn metrics_handler(State(monitor): State<Monitor>) -> Response {
    match monitor.render() {
        Some(body) => body.into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not configured\n").into_response(),
    }
}
