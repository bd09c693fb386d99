//! Per-request handler context.
//!
//! A [`Context`] owns the request, the response sink and the request's
//! [`KeyValueStore`], and it carries the continuation for the handler chain
//! being run. Handlers receive it by mutable reference and call
//! [`Context::next`] to run the rest of the chain.
//!
//! ```text
//!   router ──► [mw 0] ──next──► [mw 1] ──next──► [handler] ──next──► Ok(())
//!                 ▲                ▲                  │
//!                 └── returns ─────┴──── returns ─────┘
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{AsHeaderName, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use http_body_util::BodyExt;
use ivy_router::Params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{Instrument, Span};

use crate::config::{CompactJson, JsonCodec};
use crate::cookie::{parse_cookies, SetCookie};
use crate::error::{Error, FatalError, HandlerResult};
use crate::handler::{BoxFuture, Chain};
use crate::metadata::{restore_store, Metadata};
use crate::response::{BoxedWriter, Detached, ResponseWriter};
use crate::store::KeyValueStore;
use crate::types::{duplicate_request, Request};

/// Request header carrying the request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// State shared by the handlers of one request.
pub struct Context {
    request: Request,
    writer: BoxedWriter,
    store: KeyValueStore,
    params: Params,
    chain: Chain,
    position: usize,
    frames: Vec<(Chain, usize)>,
    span: Span,
    json: Arc<dyn JsonCodec>,
}

impl Context {
    pub(crate) fn new(
        request: Request,
        writer: BoxedWriter,
        store: KeyValueStore,
        params: Params,
        json: Arc<dyn JsonCodec>,
    ) -> Self {
        Self {
            request,
            writer,
            store,
            params,
            chain: Chain::default(),
            position: 0,
            frames: Vec::new(),
            span: Span::current(),
            json,
        }
    }

    /// Builds a context for a request that did not arrive through a router.
    ///
    /// The store carried by the request's metadata is recovered, so values
    /// written upstream stay visible. A request with no store gets a fresh
    /// one.
    pub fn from_request(mut request: Request, writer: BoxedWriter) -> Result<Self, FatalError> {
        let store = restore_store(&mut request)?;
        Ok(Self::new(
            request,
            writer,
            store,
            Params::new(),
            Arc::new(CompactJson),
        ))
    }

    // ----- continuation -----

    /// Runs the next handler in the chain.
    ///
    /// Past the end of a nested chain, the chain that contains it continues
    /// after the nested member. Returns `Ok(())` without doing anything when
    /// the current handler is the last one of the outermost chain. Errors
    /// from downstream handlers are returned unchanged.
    pub fn next(&mut self) -> BoxFuture<'_, HandlerResult> {
        if self.position + 1 < self.chain.len() {
            self.position += 1;
            return self.invoke();
        }
        let Some((chain, position)) = self.frames.pop() else {
            return Box::pin(std::future::ready(Ok(())));
        };
        Box::pin(async move {
            let inner = self.swap_continuation(chain, position);
            let result = self.next().await;
            let outer = self.swap_continuation(inner.0, inner.1);
            self.frames.push(outer);
            result
        })
    }

    /// Index of the handler currently running.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of handlers in the chain being run.
    #[must_use]
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    fn swap_continuation(&mut self, chain: Chain, position: usize) -> (Chain, usize) {
        (
            std::mem::replace(&mut self.chain, chain),
            std::mem::replace(&mut self.position, position),
        )
    }

    /// Makes `chain` the current continuation, saving the enclosing one as
    /// a frame.
    pub(crate) fn enter_chain(&mut self, chain: Chain) {
        let outer = self.swap_continuation(chain, 0);
        self.frames.push(outer);
    }

    /// Restores the enclosing continuation saved by [`Self::enter_chain`].
    pub(crate) fn leave_chain(&mut self) {
        if let Some((chain, position)) = self.frames.pop() {
            self.swap_continuation(chain, position);
        }
    }

    /// Runs the handler at the current position, which must be the first
    /// handler of a freshly entered chain.
    pub(crate) fn run_chain(&mut self) -> BoxFuture<'_, HandlerResult> {
        self.invoke()
    }

    fn invoke(&mut self) -> BoxFuture<'_, HandlerResult> {
        let Some(handler) = self.chain.get(self.position).cloned() else {
            return Box::pin(std::future::ready(Ok(())));
        };
        let span = self.span.clone();
        Box::pin(async move { handler.call(self).instrument(span).await })
    }

    // ----- request -----

    /// The request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The request, mutably. Changes are seen by later handlers.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// A request header as text. `None` if absent or not visible ASCII.
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.request.headers().get(name)?.to_str().ok()
    }

    /// The value bound to a path parameter, e.g. `id` in `/users/{id}`.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// All path parameter bindings.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Decoded query string pairs in order. A malformed query yields none.
    #[must_use]
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.request
            .uri()
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default()
    }

    /// The first value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Deserializes the query string into `T`. Failures map to 400.
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let query = self.request.uri().query().unwrap_or("");
        serde_urlencoded::from_str(query)
            .map_err(|e| Error::bad_request(format!("invalid query string: {e}")))
    }

    /// The request body.
    pub async fn body(&self) -> Bytes {
        match self.request.body().clone().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        }
    }

    /// Decodes a JSON request body with the router's codec.
    pub async fn parse_body<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let bytes = self.body().await;
        let value = self.json.decode(&bytes)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Request cookies in header order.
    #[must_use]
    pub fn cookies(&self) -> Vec<(String, String)> {
        parse_cookies(self.request.headers())
    }

    /// The value of the first request cookie named `name`.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// The `X-Request-ID` request header.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.header(REQUEST_ID_HEADER)
    }

    /// Sets the `X-Request-ID` request header seen by later handlers.
    pub fn set_request_id(&mut self, id: &str) -> HandlerResult {
        let value = HeaderValue::from_str(id)
            .map_err(|_| Error::InvalidHeader(format!("{REQUEST_ID_HEADER}: {id}")))?;
        self.request
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        Ok(())
    }

    // ----- request-scoped state -----

    /// The request's key-value store.
    ///
    /// The store is shared with every router and foreign handler this
    /// request passes through.
    #[must_use]
    pub fn store(&self) -> &KeyValueStore {
        &self.store
    }

    /// The request metadata.
    #[must_use]
    pub fn metadata(&self) -> Metadata {
        Metadata::of(&self.request)
    }

    /// Binds `key` in the request metadata.
    pub fn set_metadata_value<V>(&mut self, key: impl Into<String>, value: V)
    where
        V: std::any::Any + Send + Sync,
    {
        self.metadata()
            .with_value(key, value)
            .attach(&mut self.request);
    }

    /// The span handlers of this request run in.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Replaces the span for handlers that run after this call.
    ///
    /// Middleware uses this to attach fields, such as a request id, to
    /// everything logged downstream.
    pub fn set_span(&mut self, span: Span) {
        self.span = span;
    }

    // ----- response -----

    /// The response sink.
    #[must_use]
    pub fn response_writer(&self) -> &dyn ResponseWriter {
        &*self.writer
    }

    /// The response sink, mutably.
    pub fn response_writer_mut(&mut self) -> &mut dyn ResponseWriter {
        &mut *self.writer
    }

    /// Replaces the response sink and returns the previous one.
    pub fn set_response_writer(&mut self, writer: BoxedWriter) -> BoxedWriter {
        std::mem::replace(&mut self.writer, writer)
    }

    /// Takes the response sink, leaving a placeholder that discards writes
    /// until a sink is set again.
    pub fn take_response_writer(&mut self) -> BoxedWriter {
        self.set_response_writer(Box::<Detached>::default())
    }

    /// Replaces the sink with a wrapper around it.
    pub fn wrap_response_writer<F>(&mut self, wrap: F)
    where
        F: FnOnce(BoxedWriter) -> BoxedWriter,
    {
        let inner = self.take_response_writer();
        self.writer = wrap(inner);
    }

    /// Response headers.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        self.writer.headers_mut()
    }

    /// Sets a response header, replacing existing values.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> HandlerResult
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let (name, value) = header_pair(name, value)?;
        self.writer.headers_mut().insert(name, value);
        Ok(())
    }

    /// Appends a response header value.
    pub fn add_header<K, V>(&mut self, name: K, value: V) -> HandlerResult
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let (name, value) = header_pair(name, value)?;
        self.writer.headers_mut().append(name, value);
        Ok(())
    }

    /// Appends a `Set-Cookie` header.
    pub fn set_cookie(&mut self, cookie: &SetCookie) -> HandlerResult {
        self.add_header(SET_COOKIE, cookie.to_string())
    }

    /// Tells the client to drop a cookie.
    pub fn clear_cookie(&mut self, name: &str) -> HandlerResult {
        self.set_cookie(&SetCookie::removal(name))
    }

    /// Writes the response status. Only the first status write counts.
    ///
    /// ```rust,ignore
    /// ctx.status(StatusCode::CREATED).send_string("created")
    /// ```
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.writer.write_status(status);
        self
    }

    /// The status written so far.
    #[must_use]
    pub fn response_status(&self) -> Option<StatusCode> {
        self.writer.status()
    }

    /// Writes a status with no body.
    pub fn send_status(&mut self, status: StatusCode) -> HandlerResult {
        self.status(status);
        Ok(())
    }

    /// Appends raw bytes to the body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.writer.write(bytes);
    }

    /// Writes bytes as the body.
    pub fn send_bytes(&mut self, bytes: impl AsRef<[u8]>) -> HandlerResult {
        self.writer.write(bytes.as_ref());
        Ok(())
    }

    /// Writes text as the body.
    pub fn send_string(&mut self, text: impl AsRef<str>) -> HandlerResult {
        self.default_content_type("text/plain; charset=utf-8");
        self.writer.write(text.as_ref().as_bytes());
        Ok(())
    }

    /// Writes HTML as the body.
    pub fn send_html(&mut self, html: impl AsRef<[u8]>) -> HandlerResult {
        self.writer
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        self.writer.write(html.as_ref());
        Ok(())
    }

    /// Encodes `value` with the router's JSON codec and writes it as the
    /// body.
    pub fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> HandlerResult {
        let value = serde_json::to_value(value)?;
        let bytes = self.json.encode(&value)?;
        self.writer
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.writer.write(&bytes);
        Ok(())
    }

    /// Flushes the response sink.
    pub fn flush(&mut self) {
        self.writer.flush();
    }

    fn default_content_type(&mut self, value: &'static str) {
        let headers = self.writer.headers_mut();
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
        }
    }

    // ----- crate internals -----

    /// A copy of the request under `uri`, sharing metadata and store.
    pub(crate) fn forward_request(&self, uri: Uri) -> Request {
        duplicate_request(&self.request, uri)
    }

    pub(crate) fn request_and_writer(&mut self) -> (&Request, &mut dyn ResponseWriter) {
        (&self.request, &mut *self.writer)
    }

    pub(crate) fn into_writer(self) -> BoxedWriter {
        self.writer
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("params", &self.params)
            .field("position", &self.position)
            .field("chain_len", &self.chain.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn header_pair<K, V>(name: K, value: V) -> Result<(HeaderName, HeaderValue), Error>
where
    K: TryInto<HeaderName>,
    V: TryInto<HeaderValue>,
{
    let name = name
        .try_into()
        .map_err(|_| Error::InvalidHeader("header name".to_string()))?;
    let value = value
        .try_into()
        .map_err(|_| Error::InvalidHeader(format!("value for `{name}`")))?;
    Ok((name, value))
}
