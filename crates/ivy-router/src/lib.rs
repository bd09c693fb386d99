//! Radix tree path matcher for Ivy.
//!
//! The matcher resolves `(method, path)` to a registered value plus the
//! ordered parameter bindings captured along the way. It knows nothing about
//! handlers or requests; the `ivy` crate stores composed handler chains in it.
//!
//! ```text
//!                  (root)
//!                    │
//!           ┌────────┴────────┐
//!         users             files
//!           │                 │
//!     ┌─────┴─────┐         *path
//!   (leaf)      {id}          │
//!   [GET]         │         (leaf)
//!              (leaf)       [GET]
//!            [GET,DELETE]
//! ```
//!
//! # Example
//!
//! ```rust
//! use ivy_router::{Lookup, RouteTree};
//! use http::Method;
//!
//! let mut tree = RouteTree::new();
//! tree.insert(Some(Method::GET), "/files/*path", "files");
//!
//! let m = tree.lookup(&Method::GET, "/files/a/b.png").found().unwrap();
//! assert_eq!(m.params.get("path"), Some("a/b.png"));
//! assert!(matches!(tree.lookup(&Method::POST, "/files/x"), Lookup::MethodNotAllowed(_)));
//! ```

#![forbid(unsafe_code)]

mod method_router;
mod node;
mod params;
mod router;

pub use method_router::MethodRouter;
pub use node::{Node, SegmentKind};
pub use params::Params;
pub use router::{Lookup, Match, RouteTree};
