//! Response sinks.
//!
//! Handlers write into a [`ResponseWriter`] rather than returning a
//! response. The first status write wins; writing body bytes before any
//! status implies `200 OK`. Middleware may replace the sink for the rest of
//! the chain, typically with a wrapper that observes writes and forwards
//! them (see [`Context::wrap_response_writer`]).
//!
//! [`Context::wrap_response_writer`]: crate::Context::wrap_response_writer

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

use crate::types::Response;

/// An owned, type-erased response sink.
pub type BoxedWriter = Box<dyn ResponseWriter>;

/// Destination for response headers, status and body bytes.
pub trait ResponseWriter: Send + Sync + 'static {
    /// Response headers. Changes after the status is written are kept but
    /// have no effect on a sink that has already flushed.
    fn headers(&self) -> &HeaderMap;

    /// Mutable response headers.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Writes the status. Only the first call has an effect.
    fn write_status(&mut self, status: StatusCode);

    /// Appends body bytes, writing `200 OK` first if no status was written.
    fn write(&mut self, chunk: &[u8]);

    /// The status written so far.
    fn status(&self) -> Option<StatusCode>;

    /// Pushes buffered output towards the client if the sink supports it.
    fn flush(&mut self) {}

    /// Converts the sink into the final response.
    fn into_response(self: Box<Self>) -> Response;
}

/// In-memory sink used by the server and by tests.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedResponse {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty boxed sink.
    #[must_use]
    pub fn boxed() -> BoxedWriter {
        Box::new(Self::new())
    }

    /// Body bytes written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if let Some(existing) = self.status {
            tracing::debug!(
                existing = existing.as_u16(),
                ignored = status.as_u16(),
                "superfluous status write"
            );
            return;
        }
        self.status = Some(status);
    }

    fn write(&mut self, chunk: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn into_response(self: Box<Self>) -> Response {
        let this = *self;
        let mut response = http::Response::new(Full::new(this.body.freeze()));
        *response.status_mut() = this.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = this.headers;
        response
    }
}

/// Placeholder held by a context while its real sink is lent out.
///
/// Writes are discarded.
#[derive(Debug, Default)]
pub(crate) struct Detached {
    headers: HeaderMap,
}

impl ResponseWriter for Detached {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        tracing::warn!(status = status.as_u16(), "status written to a detached response");
    }

    fn write(&mut self, _chunk: &[u8]) {
        tracing::warn!("body written to a detached response");
    }

    fn status(&self) -> Option<StatusCode> {
        None
    }

    fn into_response(self: Box<Self>) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}
