//! Response interception.
//!
//! A handler in this stack does not write into a response writer; it returns a
//! `Response` whose body is streamed afterwards by the server. Observing the
//! final status and byte count therefore takes two pieces:
//!
//! - [`ResponseInterceptor`] holds the per-request measurements (start time,
//!   effective status, bytes written).
//! - [`InterceptedBody`] wraps the outbound body, forwards every frame
//!   untouched, counts data bytes into the interceptor and fires a completion
//!   hook exactly once when the body ends or is dropped.

use bytes::Buf;
use http::StatusCode;
use http_body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Status reported when the inner handler never sets one explicitly.
///
/// This mirrors the transport convention: a response with no explicit
/// status line goes out as `200 OK`.
pub const DEFAULT_STATUS: StatusCode = StatusCode::OK;

/// Per-request measurements taken around the inner handler.
///
/// The byte counter is atomic so the interceptor can be shared by reference
/// with any writer, including one that writes from several tasks.
#[derive(Debug)]
pub struct ResponseInterceptor {
    started: Instant,
    status: AtomicU16,
    bytes_written: AtomicU64,
}

impl ResponseInterceptor {
    /// Starts the request clock.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            status: AtomicU16::new(DEFAULT_STATUS.as_u16()),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Records `status` as the effective response status. Last write wins.
    pub fn set_status(&self, status: StatusCode) {
        self.status.store(status.as_u16(), Ordering::Relaxed);
    }

    /// Adds `n` bytes to the running total.
    pub fn record_write(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn status(&self) -> u16 {
        self.status.load(Ordering::Relaxed)
    }

    pub fn status_as_string(&self) -> String {
        self.status().to_string()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Time since the interceptor was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for ResponseInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body wrapper that counts bytes and reports completion.
///
/// `on_complete` runs once, either when the inner body yields its final frame
/// or when the wrapper is dropped before that (client disconnect, upstream
/// timeout, a HEAD response the server never polls). In the abort case the
/// hook sees whatever was written up to that point.
pub struct InterceptedBody<B, F>
where
    F: FnOnce(&ResponseInterceptor),
{
    inner: B,
    interceptor: ResponseInterceptor,
    on_complete: Option<F>,
}

impl<B, F> InterceptedBody<B, F>
where
    F: FnOnce(&ResponseInterceptor),
{
    pub fn new(inner: B, interceptor: ResponseInterceptor, on_complete: F) -> Self {
        Self {
            inner,
            interceptor,
            on_complete: Some(on_complete),
        }
    }

    pub fn interceptor(&self) -> &ResponseInterceptor {
        &self.interceptor
    }

    fn complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(&self.interceptor);
        }
    }
}

impl<B, F> Drop for InterceptedBody<B, F>
where
    F: FnOnce(&ResponseInterceptor),
{
    fn drop(&mut self) {
        self.complete();
    }
}

impl<B, F> Body for InterceptedBody<B, F>
where
    B: Body + Unpin,
    F: FnOnce(&ResponseInterceptor) + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.interceptor.record_write(data.remaining());
                }
            }
            Poll::Ready(None) => this.complete(),
            // Errors pass through untouched; completion happens on drop.
            Poll::Ready(Some(Err(_))) | Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
