//! Handlers and handler chains.
//!
//! Middleware and terminal handlers share one shape: an async function of
//! a mutable [`Context`] that may fail. A middleware is simply a handler
//! that calls [`Context::next`] to run the rest of its chain; one that
//! returns without calling it short-circuits the request.
//!
//! # Example
//!
//! ```rust
//! use ivy::{handler, Context};
//!
//! let timing = handler(|ctx: &mut Context| {
//!     Box::pin(async move {
//!         let started = std::time::Instant::now();
//!         let result = ctx.next().await;
//!         tracing::debug!(elapsed = ?started.elapsed(), "chain finished");
//!         result
//!     })
//! });
//! # let _ = timing;
//! ```

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::HandlerResult;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unit of request processing.
///
/// Implemented for every closure of the form
/// `Fn(&mut Context) -> BoxFuture<'_, HandlerResult>`; use [`handler`] to
/// get closure signatures inferred.
pub trait Handler: Send + Sync + 'static {
    /// Processes the request held by `ctx`.
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        self(ctx)
    }
}

/// A shared, type-erased handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// Wraps a closure as a [`BoxedHandler`].
pub fn handler<F>(f: F) -> BoxedHandler
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a handler value as a [`BoxedHandler`].
pub fn boxed<H: Handler>(h: H) -> BoxedHandler {
    Arc::new(h)
}

/// An ordered, immutable sequence of handlers run as one unit.
///
/// Invoking a chain runs its first handler; each [`Context::next`] call
/// advances to the following one. Calling `next` past the last handler of
/// the outermost chain is a no-op that returns `Ok(())`.
///
/// A chain used as a handler inside another chain runs with its own
/// position. Calling `next` from its last handler continues the outer chain
/// after the nested member. An inner handler that returns without calling
/// `next` stops the outer chain too.
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Arc<[BoxedHandler]>,
}

impl Chain {
    /// Creates a chain from handlers in invocation order.
    #[must_use]
    pub fn new(handlers: Vec<BoxedHandler>) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }

    /// Composes middlewares and handlers into one chain, middlewares first.
    ///
    /// Both inputs keep their relative order.
    #[must_use]
    pub fn compose<I>(middlewares: &[BoxedHandler], handlers: I) -> Self
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        let all: Vec<BoxedHandler> = middlewares.iter().cloned().chain(handlers).collect();
        Self::new(all)
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if the chain has no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the handler at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&BoxedHandler> {
        self.handlers.get(position)
    }
}

impl Deref for Chain {
    type Target = [BoxedHandler];

    fn deref(&self) -> &Self::Target {
        &self.handlers
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("len", &self.len()).finish()
    }
}

impl FromIterator<BoxedHandler> for Chain {
    fn from_iter<I: IntoIterator<Item = BoxedHandler>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Handler for Chain {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            ctx.enter_chain(self.clone());
            let result = ctx.run_chain().await;
            ctx.leave_chain();
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> BoxedHandler {
        handler(|ctx: &mut Context| Box::pin(async move { ctx.next().await }))
    }

    #[test]
    fn test_compose_orders_middlewares_first() {
        let mw = vec![noop(), noop()];
        let terminal = noop();
        let chain = Chain::compose(&mw, [terminal.clone()]);

        assert_eq!(chain.len(), 3);
        assert!(Arc::ptr_eq(&chain[0], &mw[0]));
        assert!(Arc::ptr_eq(&chain[1], &mw[1]));
        assert!(Arc::ptr_eq(&chain[2], &terminal));
    }

    #[test]
    fn test_compose_without_middlewares() {
        let chain = Chain::compose(&[], [noop()]);
        assert_eq!(chain.len(), 1);
        assert!(chain.get(1).is_none());
    }

    #[test]
    fn test_empty_chain() {
        let chain = Chain::default();
        assert!(chain.is_empty());
        assert_eq!(format!("{chain:?}"), "Chain { len: 0 }");
    }

    #[test]
    fn test_collect() {
        let chain: Chain = (0..4).map(|_| noop()).collect();
        assert_eq!(chain.len(), 4);
    }
}
