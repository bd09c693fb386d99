//! Request logging middleware.
//!
//! Logs one `debug` line when a request enters the chain and one `info`
//! line when it leaves:
//!
//! ```text
//! ❯❯ GET /users?page=2
//! ❮❮ 200 GET /users?page=2 took 0.01s
//! ```
//!
//! The status comes from a [`StatusRecorder`] installed around the
//! response writer, so it reflects what downstream handlers actually wrote,
//! including writes made inside mounted routers.
//!
//! A chain that fails without writing is logged with
//! [`Error::status`](ivy::Error::status). The router's error handler writes
//! the response only after the logger has returned, so the logged status can
//! differ from the one sent: the default handler always answers `500`, and a
//! custom handler may pick any status.

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;

use http::{HeaderMap, StatusCode};
use ivy::{
    BoxFuture, BoxedHandler, BoxedWriter, Context, Handler, HandlerResult, Response,
    ResponseWriter,
};
use tracing::Span;

type RouteFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Request logger.
///
/// Failed chains are logged with the error's own status, not the status the
/// error handler later writes.
///
/// # Example
///
/// ```
/// use ivy::Router;
/// use ivy_middleware::Logger;
///
/// let mut router = Router::new();
/// router.use_middleware([Logger::new()
///     .show_query(false)
///     .route_filter(|path| path != "/healthz")
///     .into_handler()]);
/// ```
#[derive(Clone)]
#[must_use]
pub struct Logger {
    show_query: bool,
    route_filter: Option<RouteFilter>,
    span: Option<Span>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a logger that includes the query string and logs every route.
    pub fn new() -> Self {
        Self {
            show_query: true,
            route_filter: None,
            span: None,
        }
    }

    /// Whether the logged route includes the query string.
    pub fn show_query(mut self, show: bool) -> Self {
        self.show_query = show;
        self
    }

    /// Only requests whose path satisfies `filter` are logged.
    pub fn route_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.route_filter = Some(Arc::new(filter));
        self
    }

    /// Emits events under `span` instead of the request's span.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Boxes the middleware for registration on a router.
    #[must_use]
    pub fn into_handler(self) -> BoxedHandler {
        Arc::new(self)
    }

    fn route(&self, ctx: &Context) -> String {
        match ctx.uri().query() {
            Some(query) if self.show_query => format!("{}?{query}", ctx.path()),
            _ => ctx.path().to_string(),
        }
    }

    async fn process(&self, ctx: &mut Context) -> HandlerResult {
        if let Some(filter) = &self.route_filter {
            if !filter(ctx.path()) {
                return ctx.next().await;
            }
        }

        let route = self.route(ctx);
        let method = ctx.method().clone();
        let request_id = ctx.request_id().map(str::to_string);
        let parent = self.span.clone().unwrap_or_else(|| ctx.span().clone());

        let status = Arc::new(AtomicU16::new(0));
        let recorded = Arc::clone(&status);
        ctx.wrap_response_writer(|inner| -> BoxedWriter {
            Box::new(StatusRecorder::new(inner, recorded))
        });

        let started = Instant::now();
        tracing::debug!(parent: &parent, request_id, "❯❯ {method} {route}");
        let result = ctx.next().await;
        let status = logged_status(&result, status.load(Ordering::Acquire));
        tracing::info!(
            parent: &parent,
            request_id,
            "❮❮ {status} {method} {route} took {:.2}s",
            started.elapsed().as_secs_f64()
        );
        result
    }
}

/// Status to log for a finished chain, given the status written so far.
///
/// A failed chain has not written yet; its error handler runs after us.
fn logged_status(result: &HandlerResult, written: u16) -> u16 {
    match (result, written) {
        (Err(err), 0) => err.status().as_u16(),
        (_, written) => written,
    }
}

impl Handler for Logger {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.process(ctx))
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("show_query", &self.show_query)
            .field("route_filter", &self.route_filter.is_some())
            .finish_non_exhaustive()
    }
}

/// Request logger with default options.
#[must_use]
pub fn logger() -> BoxedHandler {
    Logger::new().into_handler()
}

/// Response writer wrapper that records the status written through it.
///
/// The status is published to a shared cell as soon as it is known: on the
/// first explicit status write, or as `200` on the first body write.
pub struct StatusRecorder {
    inner: BoxedWriter,
    status: Arc<AtomicU16>,
}

impl StatusRecorder {
    /// Wraps `inner`, publishing its status to `status`.
    #[must_use]
    pub fn new(inner: BoxedWriter, status: Arc<AtomicU16>) -> Self {
        Self { inner, status }
    }

    fn publish(&self) {
        if let Some(status) = self.inner.status() {
            self.status.store(status.as_u16(), Ordering::Release);
        }
    }
}

impl ResponseWriter for StatusRecorder {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        self.inner.write_status(status);
        self.publish();
    }

    fn write(&mut self, chunk: &[u8]) {
        self.inner.write(chunk);
        self.publish();
    }

    fn status(&self) -> Option<StatusCode> {
        self.inner.status()
    }

    fn flush(&mut self) {
        self.inner.flush();
    }

    fn into_response(self: Box<Self>) -> Response {
        self.inner.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivy::{error_handler, handler, BufferedResponse, Error, Router};
    use ivy_test::TestClient;

    #[test]
    fn test_recorder_publishes_status() {
        let status = Arc::new(AtomicU16::new(0));
        let mut writer = StatusRecorder::new(BufferedResponse::boxed(), Arc::clone(&status));
        assert_eq!(status.load(Ordering::Acquire), 0);

        writer.write_status(StatusCode::CREATED);
        writer.write_status(StatusCode::ACCEPTED);
        assert_eq!(status.load(Ordering::Acquire), 201);
        assert_eq!(Box::new(writer).into_response().status(), StatusCode::CREATED);
    }

    #[test]
    fn test_recorder_body_implies_ok() {
        let status = Arc::new(AtomicU16::new(0));
        let mut writer = StatusRecorder::new(BufferedResponse::boxed(), Arc::clone(&status));
        writer.write(b"hi");
        assert_eq!(status.load(Ordering::Acquire), 200);
    }

    #[test]
    fn test_logged_status_for_failed_chain_is_error_status() {
        let failed: HandlerResult = Err(Error::not_found("gone"));
        assert_eq!(logged_status(&failed, 0), 404);
        assert_eq!(logged_status(&failed, 409), 409);
        assert_eq!(logged_status(&Ok(()), 0), 0);
        assert_eq!(logged_status(&Ok(()), 204), 204);
    }

    #[test]
    fn test_route_with_and_without_query() {
        let request = http::Request::builder()
            .uri("/users?page=2")
            .body(http_body_util::Full::new(bytes::Bytes::new()))
            .unwrap();
        let ctx = Context::from_request(request, BufferedResponse::boxed()).unwrap();
        assert_eq!(Logger::new().route(&ctx), "/users?page=2");
        assert_eq!(Logger::new().show_query(false).route(&ctx), "/users");
    }

    fn failing_router() -> Router {
        let mut router = Router::new();
        router.use_middleware([logger()]);
        router.get(
            "/ok",
            [handler(|ctx: &mut Context| Box::pin(async move { ctx.send_string("ok") }))],
        );
        router.get(
            "/fail",
            [handler(|_ctx: &mut Context| {
                Box::pin(async move { Err(Error::bad_request("nope")) })
            })],
        );
        router
    }

    #[tokio::test]
    async fn test_logger_is_transparent() {
        let client = TestClient::new(failing_router());

        client.get("/ok?x=1").send().await.assert_body_eq("ok");
        client
            .get("/fail")
            .send()
            .await
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_custom_error_handler_status_reaches_client() {
        // Logged as 400, answered as 418.
        let mut router = failing_router();
        router.set_error_handler(error_handler(|_err, w, _req| {
            w.write_status(StatusCode::IM_A_TEAPOT);
        }));
        TestClient::new(router)
            .get("/fail")
            .send()
            .await
            .assert_status(StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_filtered_routes_still_run() {
        let mut router = Router::new();
        router.use_middleware([Logger::new().route_filter(|_| false).into_handler()]);
        router.get(
            "/",
            [handler(|ctx: &mut Context| Box::pin(async move { ctx.send_string("ran") }))],
        );
        TestClient::new(router)
            .get("/")
            .send()
            .await
            .assert_body_eq("ran");
    }
}
