//! HTTP metrics middleware.
//!
//! Records, for every request passing through it:
//! - `request_seconds` - time from entering the middleware until the
//!   response body has been fully sent (or dropped)
//! - `response_size_bytes` - data bytes of the response body
//!
//! Both observations carry the same six labels (see
//! [`RequestLabels`](crate::registry::RequestLabels)). They are recorded
//! once, after the body completes, so status and size are final.
//!
//! # Error message header
//!
//! The configured header (default `error-message`) fills the `errorMessage`
//! label. It is taken from the inbound request and removed before the inner
//! handler runs. A handler can also set it on its response; that value wins
//! and is stripped before the response leaves the server.
//!
//! Nothing in here can fail: an unresolved route becomes `""`, a non-UTF-8
//! error header is decoded lossily.

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use http::{HeaderMap, HeaderName, Version};

use crate::interceptor::{InterceptedBody, ResponseInterceptor};
use crate::monitor::Monitor;
use crate::registry::RequestLabels;

/// Middleware that records request duration and response size.
///
/// Install it with [`Monitor::prometheus`], or directly:
///
/// ```ignore
/// Router::new()
///     .route("/users/:id", get(handler))
///     .layer(middleware::from_fn_with_state(monitor, http_metrics_middleware))
/// ```
pub async fn http_metrics_middleware(
    State(monitor): State<Monitor>,
    mut request: Request,
    next: Next,
) -> Response {
    let interceptor = ResponseInterceptor::new();

    let route = route_template(&request);
    let protocol = protocol_label(request.version());
    let method = request.method().as_str().to_owned();
    let request_error = take_header(request.headers_mut(), monitor.error_header());

    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    interceptor.set_status(parts.status);
    let error_message = take_header(&mut parts.headers, monitor.error_header())
        .or(request_error)
        .unwrap_or_default();

    let body = InterceptedBody::new(body, interceptor, move |interceptor: &ResponseInterceptor| {
        let status = interceptor.status();
        let labels = RequestLabels {
            protocol,
            status: interceptor.status_as_string(),
            method,
            route,
            is_error: monitor.is_error(status).to_string(),
            error_message,
        };
        monitor.record_request(&labels, interceptor.elapsed(), interceptor.bytes_written());
    });

    Response::from_parts(parts, Body::new(body))
}

/// The matched route template (`/users/:id`), or `""` if routing did not match.
fn route_template(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_default()
}

/// `HTTP/1.1`, `HTTP/2.0`, ... as written on the wire.
fn protocol_label(version: Version) -> String {
    format!("{version:?}")
}

/// Remove `name` from `headers`, returning its first value.
fn take_header(headers: &mut HeaderMap, name: &HeaderName) -> Option<String> {
    let value = headers.remove(name)?;
    Some(match value.to_str() {
        Ok(s) => s.to_owned(),
        Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_protocol_label() {
        assert_eq!(protocol_label(Version::HTTP_10), "HTTP/1.0");
        assert_eq!(protocol_label(Version::HTTP_11), "HTTP/1.1");
        assert_eq!(protocol_label(Version::HTTP_2), "HTTP/2.0");
    }

    #[test]
    fn test_take_header_removes_all_values() {
        let name = HeaderName::from_static("error-message");
        let mut headers = HeaderMap::new();
        headers.append(&name, HeaderValue::from_static("first"));
        headers.append(&name, HeaderValue::from_static("second"));

        assert_eq!(take_header(&mut headers, &name).as_deref(), Some("first"));
        assert!(headers.get(&name).is_none());
        assert_eq!(take_header(&mut headers, &name), None);
    }

    #[test]
    fn test_take_header_decodes_non_utf8_lossily() {
        let name = HeaderName::from_static("error-message");
        let mut headers = HeaderMap::new();
        headers.insert(&name, HeaderValue::from_bytes(b"bad \xff byte").unwrap());

        assert_eq!(
            take_header(&mut headers, &name).as_deref(),
            Some("bad \u{fffd} byte")
        );
    }

    #[test]
    fn test_route_template_empty_when_unmatched() {
        let request = http::Request::builder()
            .uri("/users/42")
            .body(Body::empty())
            .unwrap();
        assert_eq!(route_template(&request), "");
    }
}
