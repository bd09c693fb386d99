//! # Ivy Middleware
//!
//! Ready-made middlewares for [`ivy::Router`]. Each one is an ordinary
//! handler built on the public [`ivy::Context`] contract, so it can be
//! registered router-wide with `use_middleware` or in front of a single
//! route.
//!
//! | Middleware                 | Purpose                                         |
//! |----------------------------|-------------------------------------------------|
//! | [`Logger`]                 | Entry and exit log lines with status and timing |
//! | [`RequestId`]              | Ensure and propagate `X-Request-ID`             |
//! | [`BasicAuth`]              | HTTP Basic authentication                       |
//! | [`required_query_params`]  | Reject requests missing query parameters        |
//!
//! ## Example
//!
//! ```
//! use ivy::Router;
//! use ivy_middleware::{logger, request_id};
//!
//! let mut router = Router::new();
//! // Request ids first, so the logger sees them.
//! router.use_middleware([request_id(), logger()]);
//! ```

#![doc(html_root_url = "https://docs.rs/ivy-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod basic_auth;
pub mod logger;
pub mod query_params;
pub mod request_id;

// Re-export main types at crate root
pub use basic_auth::{basic_auth, BasicAuth};
pub use logger::{logger, Logger, StatusRecorder};
pub use query_params::required_query_params;
pub use request_id::{request_id, RequestId};
