//! # Ivy Test
//!
//! In-memory testing for Ivy endpoints. Requests are built with a fluent
//! API and dispatched straight into a [`Router`](ivy::Router) or any other
//! [`Endpoint`](ivy::Endpoint); no socket is opened.
//!
//! ```
//! use ivy::{handler, Context, Router};
//! use ivy_test::TestClient;
//! use http::StatusCode;
//!
//! # tokio_test::block_on(async {
//! let mut router = Router::new();
//! router.post("/users", [handler(|ctx: &mut Context| {
//!     Box::pin(async move {
//!         let user: serde_json::Value = ctx.parse_body().await?;
//!         ctx.status(StatusCode::CREATED).send_json(&user)
//!     })
//! })]);
//!
//! let response = TestClient::new(router)
//!     .post("/users")
//!     .json(&serde_json::json!({"name": "Alice"}))
//!     .send()
//!     .await;
//! response.assert_status(StatusCode::CREATED);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/ivy-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::TestRequestBuilder;
pub use response::TestResponse;
