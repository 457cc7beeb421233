//! HTTP middleware.
//!
//! # Components
//!
//! - `http_metrics` - Request duration and response size middleware

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
