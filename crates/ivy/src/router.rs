//! Route registration and request dispatch.
//!
//! A [`Router`] pairs a path [`Matcher`] with a list of router-level
//! middlewares and one error handler. Registering a route composes the
//! middlewares registered so far with the route's handlers into a single
//! [`Chain`], built once and stored in the matcher. Dispatch looks the
//! chain up, runs it in a fresh [`Context`], and routes a failure to the
//! error handler exactly once.
//!
//! # Example
//!
//! ```rust
//! use ivy::{handler, Context, Router};
//!
//! let mut api = Router::new();
//! api.get("/users/{id}", [handler(|ctx: &mut Context| {
//!     Box::pin(async move {
//!         let id = ctx.path_param("id").unwrap_or_default().to_string();
//!         ctx.send_string(id)
//!     })
//! })]);
//!
//! let mut root = Router::new();
//! root.mount("/api", api);
//! assert_eq!(root.route_count(), 2);
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use http::header::{ALLOW, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderValue, Method, StatusCode};
use ivy_router::{Lookup, RouteTree};
use tracing::Instrument;

use crate::adapter::{abort_request, endpoint_fn, from_endpoint, Endpoint};
use crate::config::{JsonCodec, RouterConfig};
use crate::context::Context;
use crate::error::{default_error_handler, Error, ErrorHandler};
use crate::handler::{BoxFuture, BoxedHandler, Chain, Handler};
use crate::metadata::restore_store;
use crate::mount::{normalize_prefix, subtree_pattern, Mount};
use crate::response::{BoxedWriter, BufferedResponse, ResponseWriter};
use crate::types::{Request, Response};

/// Resolves `(method, path)` to a registered chain.
///
/// [`RouteTree`] is the default implementation; another matcher can be
/// supplied with [`Router::with_matcher`].
pub trait Matcher: Send + Sync + 'static {
    /// Registers `chain` for `pattern`. `None` answers every method.
    fn insert(&mut self, method: Option<Method>, pattern: &str, chain: Chain);

    /// Resolves a request.
    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, Chain>;

    /// Number of registrations.
    fn len(&self) -> usize;
}

impl Matcher for RouteTree<Chain> {
    fn insert(&mut self, method: Option<Method>, pattern: &str, chain: Chain) {
        RouteTree::insert(self, method, pattern, chain);
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, Chain> {
        RouteTree::lookup(self, method, path)
    }

    fn len(&self) -> usize {
        RouteTree::len(self)
    }
}

/// Request router.
///
/// Routes, middlewares and mounts are registered during setup through
/// `&mut self`; dispatch then needs only `&self`, so a configured router
/// can be shared across connections behind an [`Arc`].
pub struct Router {
    matcher: Box<dyn Matcher>,
    middlewares: Vec<BoxedHandler>,
    error_handler: OnceLock<ErrorHandler>,
    json: Arc<dyn JsonCodec>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a router with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Creates a router from explicit configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        Self::with_matcher(config, RouteTree::<Chain>::new())
    }

    /// Creates a router that resolves routes with `matcher`.
    #[must_use]
    pub fn with_matcher<M: Matcher>(config: RouterConfig, matcher: M) -> Self {
        let error_handler = OnceLock::new();
        if let Some(handler) = config.error_handler {
            let _ = error_handler.set(handler);
        }
        Self {
            matcher: Box::new(matcher),
            middlewares: Vec::new(),
            error_handler,
            json: config.json,
        }
    }

    // ----- middleware and error policy -----

    /// Appends router-level middlewares.
    ///
    /// Middlewares apply to routes registered after this call and run
    /// before those routes' own handlers, in the order they were added.
    pub fn use_middleware<I>(&mut self, middlewares: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.middlewares.extend(middlewares);
        self
    }

    /// Sets the error handler, replacing any configured or inherited one.
    pub fn set_error_handler(&mut self, handler: ErrorHandler) -> &mut Self {
        self.error_handler = OnceLock::from(handler);
        self
    }

    /// The error handler, if one is configured or inherited.
    #[must_use]
    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.error_handler.get()
    }

    /// Number of patterns registered. A mount counts as two.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.matcher.len()
    }

    // ----- registration -----

    /// Registers `handlers` for `method` and `pattern`.
    ///
    /// `None` registers a route that answers every method without its own
    /// entry. An empty handler list registers nothing.
    pub fn register<I>(&mut self, method: Option<Method>, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        let handlers: Vec<BoxedHandler> = handlers.into_iter().collect();
        if handlers.is_empty() {
            tracing::debug!(pattern, "skipping route with no handlers");
            return self;
        }
        let chain = Chain::compose(&self.middlewares, handlers);
        tracing::debug!(
            method = method.as_ref().map_or("*", Method::as_str),
            pattern,
            chain_len = chain.len(),
            "route registered"
        );
        self.matcher.insert(method, pattern, chain);
        self
    }

    /// Registers handlers for an arbitrary method, including extension
    /// methods.
    ///
    /// ```rust
    /// use http::Method;
    /// use ivy::{handler, Context, Router};
    ///
    /// let purge = Method::from_bytes(b"PURGE").unwrap();
    /// let mut router = Router::new();
    /// router.method(purge, "/cache", [handler(|ctx: &mut Context| {
    ///     Box::pin(async move { ctx.send_string("purged") })
    /// })]);
    /// ```
    pub fn method<I>(&mut self, method: Method, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.register(Some(method), pattern, handlers)
    }

    /// Registers `GET` handlers. `HEAD` requests fall back to them.
    pub fn get<I>(&mut self, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.method(Method::GET, pattern, handlers)
    }

    /// Registers `POST` handlers.
    pub fn post<I>(&mut self, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.method(Method::POST, pattern, handlers)
    }

    /// Registers `PUT` handlers.
    pub fn put<I>(&mut self, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.method(Method::PUT, pattern, handlers)
    }

    /// Registers `PATCH` handlers.
    pub fn patch<I>(&mut self, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.method(Method::PATCH, pattern, handlers)
    }

    /// Registers `DELETE` handlers.
    pub fn delete<I>(&mut self, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.method(Method::DELETE, pattern, handlers)
    }

    /// Registers `HEAD` handlers.
    pub fn head<I>(&mut self, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.method(Method::HEAD, pattern, handlers)
    }

    /// Registers `OPTIONS` handlers.
    pub fn options<I>(&mut self, pattern: &str, handlers: I) -> &mut Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        self.method(Method::OPTIONS, pattern, handlers)
    }

    /// Registers an endpoint for every method at `pattern`.
    ///
    /// The endpoint runs behind the router's middlewares and ends the chain.
    pub fn handle<E: Endpoint>(&mut self, pattern: &str, endpoint: E) -> &mut Self {
        self.register(None, pattern, [from_endpoint(endpoint)])
    }

    /// Registers a closure endpoint for every method at `pattern`.
    pub fn handle_fn<F>(&mut self, pattern: &str, f: F) -> &mut Self
    where
        F: Fn(&Request, &mut dyn ResponseWriter) + Send + Sync + 'static,
    {
        self.handle(pattern, endpoint_fn(f))
    }

    /// Serves `endpoint` under `prefix`, with the prefix stripped from the
    /// path it sees.
    ///
    /// Requests for the prefix itself and everything below it reach the
    /// endpoint through this router's middlewares. If the endpoint is a
    /// [`Router`] without an error handler, it receives a copy of this
    /// router's error handler now; later changes on either side are not
    /// propagated.
    pub fn mount<E: Endpoint>(&mut self, prefix: &str, endpoint: E) -> &mut Self {
        let prefix = normalize_prefix(prefix);

        if let (Some(child), Some(parent_handler)) = (endpoint.as_router(), self.error_handler.get())
        {
            if child.error_handler.set(Arc::clone(parent_handler)).is_ok() {
                tracing::debug!(prefix = %prefix, "mounted router inherits error handler");
            }
        }

        let mount: BoxedHandler = Arc::new(Mount::new(Arc::new(endpoint)));
        let chain = Chain::compose(&self.middlewares, [mount]);
        tracing::debug!(prefix = %prefix, chain_len = chain.len(), "endpoint mounted");
        self.matcher.insert(None, &subtree_pattern(&prefix), chain.clone());
        self.matcher.insert(None, &prefix, chain);
        self
    }

    // ----- dispatch -----

    /// Serves a request into a fresh in-memory response.
    pub async fn handle_request(&self, request: Request) -> Response {
        self.serve(request, BufferedResponse::boxed())
            .await
            .into_response()
    }

    async fn dispatch(&self, mut request: Request, mut writer: BoxedWriter) -> BoxedWriter {
        let (chain, params) = match self.matcher.lookup(request.method(), request.uri().path()) {
            Lookup::Found(found) => (found.value.clone(), found.params),
            Lookup::MethodNotAllowed(allowed) => {
                method_not_allowed(&mut *writer, &allowed);
                return writer;
            }
            Lookup::NotFound => {
                not_found(&mut *writer);
                return writer;
            }
        };

        let store = match restore_store(&mut request) {
            Ok(store) => store,
            Err(fatal) => {
                abort_request(&fatal, &mut *writer);
                return writer;
            }
        };

        let mut ctx = Context::new(request, writer, store, params, Arc::clone(&self.json));
        if let Err(err) = chain.call(&mut ctx).await {
            self.dispatch_error(err, &mut ctx);
        }
        ctx.into_writer()
    }

    fn dispatch_error(&self, err: Error, ctx: &mut Context) {
        tracing::debug!(error = %err, status = err.status().as_u16(), "handler chain failed");
        let (request, writer) = ctx.request_and_writer();
        match self.error_handler.get() {
            Some(handler) => handler(err, writer, request),
            None => default_error_handler(err, writer, request),
        }
    }
}

impl Endpoint for Router {
    fn serve<'a>(&'a self, request: Request, writer: BoxedWriter) -> BoxFuture<'a, BoxedWriter> {
        let span = tracing::debug_span!(
            "ivy.dispatch",
            method = %request.method(),
            path = %request.uri().path(),
        );
        Box::pin(self.dispatch(request, writer).instrument(span))
    }

    fn as_router(&self) -> Option<&Router> {
        Some(self)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.matcher.len())
            .field("middlewares", &self.middlewares.len())
            .field("error_handler", &self.error_handler.get().is_some())
            .finish_non_exhaustive()
    }
}

fn plain_text(writer: &mut dyn ResponseWriter, status: StatusCode, body: &str) {
    let headers = writer.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    writer.write_status(status);
    writer.write(body.as_bytes());
}

fn not_found(writer: &mut dyn ResponseWriter) {
    plain_text(writer, StatusCode::NOT_FOUND, "404 page not found\n");
}

fn method_not_allowed(writer: &mut dyn ResponseWriter, allowed: &[Method]) {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        writer.headers_mut().insert(ALLOW, value);
    }
    plain_text(writer, StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_handler;
    use crate::handler::handler;
    use crate::metadata::{Metadata, STORE_KEY};
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(method: Method, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn send(text: &'static str) -> BoxedHandler {
        handler(move |ctx: &mut Context| Box::pin(async move { ctx.send_string(text) }))
    }

    #[tokio::test]
    async fn test_empty_handler_list_is_noop() {
        let mut router = Router::new();
        router.get("/", Vec::new());
        assert_eq!(router.route_count(), 0);

        let response = router.handle_request(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let router = Router::new();
        let response = router.handle_request(request(Method::GET, "/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "404 page not found\n");
    }

    #[tokio::test]
    async fn test_method_not_allowed_lists_methods() {
        let mut router = Router::new();
        router.get("/items", [send("list")]);
        router.post("/items", [send("create")]);

        let response = router.handle_request(request(Method::DELETE, "/items")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST, HEAD");
    }

    #[tokio::test]
    async fn test_custom_verb() {
        let mut router = Router::new();
        let purge = Method::from_bytes(b"PURGE").unwrap();
        router.method(purge.clone(), "/cache", [send("purged")]);

        let response = router.handle_request(request(purge, "/cache")).await;
        assert_eq!(body_text(response).await, "purged");
    }

    #[tokio::test]
    async fn test_head_falls_back_to_get() {
        let mut router = Router::new();
        router.get("/", [send("hello")]);
        let response = router.handle_request(request(Method::HEAD, "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_handler_called_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let config = RouterConfig::builder()
            .error_handler(move |err, w, _req| {
                counter.fetch_add(1, Ordering::SeqCst);
                w.write_status(StatusCode::BAD_GATEWAY);
                w.write(err.to_string().as_bytes());
            })
            .build();

        let mut router = Router::with_config(config);
        router.use_middleware([handler(|ctx: &mut Context| {
            Box::pin(async move { ctx.next().await })
        })]);
        router.get("/", [handler(|_ctx: &mut Context| {
            Box::pin(async move { Err(Error::msg("upstream down")) })
        })]);

        let response = router.handle_request(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        router.get("/ok", [send("fine")]);
        router.handle_request(request(Method::GET, "/ok")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_error_handler_replaces() {
        let mut router = Router::with_config(
            RouterConfig::builder()
                .error_handler(|_err, w, _req| w.write_status(StatusCode::BAD_GATEWAY))
                .build(),
        );
        router.set_error_handler(error_handler(|_err, w, _req| {
            w.write_status(StatusCode::SERVICE_UNAVAILABLE);
        }));
        router.get("/", [handler(|_ctx: &mut Context| {
            Box::pin(async move { Err(Error::msg("x")) })
        })]);

        let response = router.handle_request(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_middleware_registered_after_route_does_not_apply() {
        let mut router = Router::new();
        router.get("/early", [send("early")]);
        router.use_middleware([handler(|ctx: &mut Context| {
            Box::pin(async move { ctx.send_status(StatusCode::FORBIDDEN) })
        })]);
        router.get("/late", [send("late")]);

        let early = router.handle_request(request(Method::GET, "/early")).await;
        assert_eq!(early.status(), StatusCode::OK);
        let late = router.handle_request(request(Method::GET, "/late")).await;
        assert_eq!(late.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_corrupt_store_aborts_without_error_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut router = Router::new();
        router.set_error_handler(error_handler(move |_err, _w, _req| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        router.get("/", [send("unreachable")]);

        let mut req = request(Method::GET, "/");
        Metadata::new().with_value(STORE_KEY, "wrong").attach(&mut req);
        let response = router.handle_request(req).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mount_strips_prefix_and_keeps_query() {
        let mut child = Router::new();
        child.get("/echo", [handler(|ctx: &mut Context| {
            Box::pin(async move {
                let seen = format!("{}?{}", ctx.path(), ctx.uri().query().unwrap_or(""));
                ctx.send_string(seen)
            })
        })]);
        child.get("/", [send("child root")]);

        let mut parent = Router::new();
        parent.mount("/v2/", child);

        let response = parent.handle_request(request(Method::GET, "/v2/echo?x=1")).await;
        assert_eq!(body_text(response).await, "/echo?x=1");

        let response = parent.handle_request(request(Method::GET, "/v2")).await;
        assert_eq!(body_text(response).await, "child root");
    }

    #[test]
    fn test_mount_inherits_error_handler_once() {
        let parent_handler = error_handler(|_err, _w, _req| {});
        let mut parent = Router::new();
        parent.set_error_handler(Arc::clone(&parent_handler));

        let child = Arc::new(Router::new());
        parent.mount("/a", Arc::clone(&child));
        let inherited = child.error_handler().unwrap();
        assert!(Arc::ptr_eq(inherited, &parent_handler));

        let mut other_parent = Router::new();
        other_parent.set_error_handler(error_handler(|_err, _w, _req| {}));
        other_parent.mount("/b", Arc::clone(&child));
        assert!(Arc::ptr_eq(child.error_handler().unwrap(), &parent_handler));
    }

    #[test]
    fn test_mount_keeps_child_error_handler() {
        let child_handler = error_handler(|_err, _w, _req| {});
        let mut child = Router::new();
        child.set_error_handler(Arc::clone(&child_handler));
        let child = Arc::new(child);

        let mut parent = Router::new();
        parent.set_error_handler(error_handler(|_err, _w, _req| {}));
        parent.mount("/a", Arc::clone(&child));

        assert!(Arc::ptr_eq(child.error_handler().unwrap(), &child_handler));
    }

    #[tokio::test]
    async fn test_handle_fn_runs_behind_middlewares() {
        let mut router = Router::new();
        router.use_middleware([handler(|ctx: &mut Context| {
            Box::pin(async move {
                ctx.set_header("x-mw", "1")?;
                ctx.next().await
            })
        })]);
        router.handle_fn("/raw", |req, w| {
            w.write(req.method().as_str().as_bytes());
        });

        let response = router.handle_request(request(Method::PATCH, "/raw")).await;
        assert_eq!(response.headers()["x-mw"], "1");
        assert_eq!(body_text(response).await, "PATCH");
    }
}
