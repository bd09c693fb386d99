//! Common request and response types.

use bytes::Bytes;
use http::Uri;
use http_body_util::Full;

/// The request type seen by handlers.
///
/// This is a standard `http::Request` with a fully buffered body.
pub type Request = http::Request<Full<Bytes>>;

/// The response type produced by a response sink.
pub type Response = http::Response<Full<Bytes>>;

/// Copies a request under a new URI.
///
/// Method, version, headers, extensions and body are carried over.
/// Extensions are cloned, so request metadata (and the key-value store it
/// refers to) is shared with the original.
pub(crate) fn duplicate_request(request: &Request, uri: Uri) -> Request {
    let mut copy = http::Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = uri;
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    *copy.extensions_mut() = request.extensions().clone();
    copy
}
