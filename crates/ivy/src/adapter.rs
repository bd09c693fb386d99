//! Conversion between handlers and the generic endpoint interface.
//!
//! An [`Endpoint`] is anything that can serve a request into a response
//! sink: a [`Router`], a plain closure, or a third-party service wrapped to
//! fit. Endpoints have no error channel. The two adapters reconcile that
//! with handlers:
//!
//! - [`from_endpoint`] runs an endpoint as a chain member. It always
//!   succeeds once the endpoint has run.
//! - [`into_endpoint`] exposes a handler to code that only knows
//!   endpoints. A handler error is turned into a response by an error
//!   handler before the sink is returned.

use std::fmt;
use std::sync::Arc;

use http::Uri;
use ivy_router::Params;

use crate::config::CompactJson;
use crate::context::Context;
use crate::error::{default_error_handler, ErrorHandler, FatalError, HandlerResult};
use crate::handler::{BoxFuture, BoxedHandler, Chain, Handler};
use crate::metadata::restore_store;
use crate::response::{BoxedWriter, ResponseWriter};
use crate::router::Router;
use crate::types::Request;

/// Generic request-serving interface.
pub trait Endpoint: Send + Sync + 'static {
    /// Serves `request`, writing into `writer`, and hands the sink back.
    fn serve<'a>(&'a self, request: Request, writer: BoxedWriter) -> BoxFuture<'a, BoxedWriter>;

    /// Returns the endpoint as a [`Router`] if it is one.
    ///
    /// Mounting uses this to pass the parent's error handler down.
    fn as_router(&self) -> Option<&Router> {
        None
    }
}

impl<E: Endpoint + ?Sized> Endpoint for Arc<E> {
    fn serve<'a>(&'a self, request: Request, writer: BoxedWriter) -> BoxFuture<'a, BoxedWriter> {
        (**self).serve(request, writer)
    }

    fn as_router(&self) -> Option<&Router> {
        (**self).as_router()
    }
}

/// An endpoint backed by a synchronous closure.
///
/// Created by [`endpoint_fn`].
pub struct EndpointFn<F> {
    f: F,
}

/// Wraps a closure as an [`Endpoint`].
///
/// ```rust
/// use ivy::{endpoint_fn, ResponseWriter};
///
/// let health = endpoint_fn(|_req, w: &mut dyn ResponseWriter| w.write(b"ok"));
/// # let _ = health;
/// ```
pub fn endpoint_fn<F>(f: F) -> EndpointFn<F>
where
    F: Fn(&Request, &mut dyn ResponseWriter) + Send + Sync + 'static,
{
    EndpointFn { f }
}

impl<F> Endpoint for EndpointFn<F>
where
    F: Fn(&Request, &mut dyn ResponseWriter) + Send + Sync + 'static,
{
    fn serve<'a>(&'a self, request: Request, mut writer: BoxedWriter) -> BoxFuture<'a, BoxedWriter> {
        (self.f)(&request, &mut *writer);
        Box::pin(std::future::ready(writer))
    }
}

impl<F> fmt::Debug for EndpointFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointFn").finish_non_exhaustive()
    }
}

/// Lends the context's request and sink to `endpoint`, then takes the sink
/// back.
///
/// The endpoint sees a copy of the request under `uri` that carries the
/// same metadata, and therefore the same key-value store.
pub(crate) async fn forward(ctx: &mut Context, endpoint: &dyn Endpoint, uri: Uri) {
    let request = ctx.forward_request(uri);
    let writer = ctx.take_response_writer();
    let writer = endpoint.serve(request, writer).await;
    ctx.set_response_writer(writer);
}

/// A handler that runs an endpoint and always succeeds.
struct EndpointHandler<E> {
    endpoint: E,
}

impl<E: Endpoint> Handler for EndpointHandler<E> {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let uri = ctx.uri().clone();
            forward(ctx, &self.endpoint, uri).await;
            Ok(())
        })
    }
}

/// Runs an endpoint as a chain member.
///
/// The endpoint runs to completion and the handler returns `Ok(())`. It
/// does not call [`Context::next`], so it ends the chain.
pub fn from_endpoint<E: Endpoint>(endpoint: E) -> BoxedHandler {
    Arc::new(EndpointHandler { endpoint })
}

/// A handler exposed as an [`Endpoint`].
///
/// Created by [`into_endpoint`].
pub struct HandlerEndpoint {
    chain: Chain,
    error_handler: ErrorHandler,
}

impl HandlerEndpoint {
    /// Replaces the error handler used when the handler fails.
    #[must_use]
    pub fn with_error_handler(mut self, error_handler: ErrorHandler) -> Self {
        self.error_handler = error_handler;
        self
    }
}

impl fmt::Debug for HandlerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEndpoint")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Exposes a handler through the [`Endpoint`] interface.
///
/// Each request gets a context whose store is recovered from the request
/// metadata, so values written by an enclosing router stay visible. Errors
/// go to [`default_error_handler`] unless another is set with
/// [`HandlerEndpoint::with_error_handler`].
///
/// Takes the boxed form returned by [`handler`](crate::handler::handler).
/// Box a concrete [`Handler`] or a [`Chain`] with
/// [`boxed`](crate::handler::boxed) first.
pub fn into_endpoint(handler: BoxedHandler) -> HandlerEndpoint {
    HandlerEndpoint {
        chain: Chain::new(vec![handler]),
        error_handler: Arc::new(default_error_handler),
    }
}

impl Endpoint for HandlerEndpoint {
    fn serve<'a>(&'a self, mut request: Request, mut writer: BoxedWriter) -> BoxFuture<'a, BoxedWriter> {
        Box::pin(async move {
            let store = match restore_store(&mut request) {
                Ok(store) => store,
                Err(fatal) => {
                    abort_request(&fatal, &mut *writer);
                    return writer;
                }
            };
            let mut ctx = Context::new(request, writer, store, Params::new(), Arc::new(CompactJson));
            if let Err(err) = self.chain.call(&mut ctx).await {
                let (request, writer) = ctx.request_and_writer();
                (self.error_handler)(err, writer, request);
            }
            ctx.into_writer()
        })
    }
}

/// Answers a request that cannot be processed with a bare 500.
pub(crate) fn abort_request(fatal: &FatalError, writer: &mut dyn ResponseWriter) {
    tracing::error!(error = %fatal, "aborting request");
    writer.write_status(http::StatusCode::INTERNAL_SERVER_ERROR);
}
