//! # Ivy
//!
//! Request routing and middleware composition on top of hyper.
//!
//! A [`Router`] maps `(method, path)` to a chain of handlers. Router-level
//! middlewares run first, then the route's own handlers, each passing
//! control on with [`Context::next`]. Routers nest: [`Router::mount`]
//! forwards everything under a prefix to another router or to any
//! [`Endpoint`], with the parent's middlewares applied and the request's
//! [`KeyValueStore`] shared across the boundary.
//!
//! ## Request flow
//!
//! ```text
//! Server ─► Router::serve ─► matcher ─► Chain [mw..., handlers...]
//!                                           │
//!                          Mount ◄──────────┘ (prefix stripped)
//!                            │
//!                            ▼
//!                      child Router::serve ─► ...
//! ```
//!
//! A handler that returns an [`Error`] stops the chain; the router that
//! owns the chain hands the error to its [`ErrorHandler`] exactly once.
//! Errors never cross a mount: a mounted router handles its own.
//!
//! ## Example
//!
//! ```
//! use ivy::{handler, Context, Router};
//! use http_body_util::BodyExt;
//!
//! # tokio_test::block_on(async {
//! let mut router = Router::new();
//! router.use_middleware([handler(|ctx: &mut Context| {
//!     Box::pin(async move {
//!         ctx.store().set("greeting", "hello".to_string());
//!         ctx.next().await
//!     })
//! })]);
//! router.get("/", [handler(|ctx: &mut Context| {
//!     Box::pin(async move {
//!         let greeting: String = ctx.store().get("greeting").unwrap_or_default();
//!         ctx.send_string(greeting)
//!     })
//! })]);
//!
//! let request = http::Request::get("/")
//!     .body(http_body_util::Full::new(bytes::Bytes::new()))
//!     .unwrap();
//! let response = router.handle_request(request).await;
//! let body = response.into_body().collect().await.unwrap().to_bytes();
//! assert_eq!(body, "hello");
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/ivy/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod config;
pub mod context;
pub mod cookie;
pub mod error;
pub mod handler;
pub mod metadata;
mod mount;
pub mod response;
pub mod router;
pub mod server;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use adapter::{endpoint_fn, from_endpoint, into_endpoint, Endpoint, EndpointFn, HandlerEndpoint};
pub use config::{
    CompactJson, ConfigError, JsonCodec, PrettyJson, RouterConfig, RouterConfigBuilder,
    ServerConfig, ServerConfigBuilder,
};
pub use context::{Context, REQUEST_ID_HEADER};
pub use error::{
    default_error_handler, error_handler, json_error_handler, Error, ErrorHandler, FatalError,
    HandlerResult,
};
pub use handler::{boxed, handler, BoxFuture, BoxedHandler, Chain, Handler};
pub use ivy_router::Params;
pub use metadata::Metadata;
pub use response::{BoxedWriter, BufferedResponse, ResponseWriter};
pub use router::{Matcher, Router};
pub use server::{Server, ServerError};
pub use store::{KeyValueStore, LookupError};
pub use types::{Request, Response};
