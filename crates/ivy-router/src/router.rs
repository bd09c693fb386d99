//! High-level matcher API.

use http::Method;

use crate::method_router::MethodRouter;
use crate::node::Node;
use crate::params::Params;

/// A radix tree mapping `(method, path pattern)` to values.
///
/// # Pattern syntax
///
/// - literal segments: `/users/me`
/// - single-segment bindings: `/users/{id}`
/// - trailing catch-all bindings: `/files/*path` or `/files/{path...}`
///
/// Empty segments are ignored, so `/users/` and `/users` are the same path.
///
/// # Example
///
/// ```rust
/// use ivy_router::{Lookup, RouteTree};
/// use http::Method;
///
/// let mut tree = RouteTree::new();
/// tree.insert(Some(Method::GET), "/users/{id}", "show");
///
/// match tree.lookup(&Method::GET, "/users/42") {
///     Lookup::Found(m) => {
///         assert_eq!(*m.value, "show");
///         assert_eq!(m.params.get("id"), Some("42"));
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RouteTree<T> {
    root: Node<T>,
    route_count: usize,
}

impl<T> Default for RouteTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved value and the parameters bound while resolving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<'a, T> {
    /// The registered value.
    pub value: &'a T,
    /// Bindings in pattern order.
    pub params: Params,
}

/// Outcome of resolving a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a, T> {
    /// A value answers this method and path.
    Found(Match<'a, T>),
    /// The path exists but no entry answers the method.
    MethodNotAllowed(Vec<Method>),
    /// Nothing is registered at this path.
    NotFound,
}

impl<'a, T> Lookup<'a, T> {
    /// Returns the match, discarding the failure detail.
    #[must_use]
    pub fn found(self) -> Option<Match<'a, T>> {
        match self {
            Self::Found(m) => Some(m),
            _ => None,
        }
    }
}

impl<T> RouteTree<T> {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Registers `value` under `pattern`.
    ///
    /// `method == None` registers an entry that answers every method without
    /// its own entry. Registering the same method and pattern again replaces
    /// the earlier value.
    ///
    /// # Panics
    ///
    /// See [`Node::insert`].
    pub fn insert(&mut self, method: Option<Method>, pattern: &str, value: T) {
        self.root.insert(pattern, method, value);
        self.route_count += 1;
    }

    /// Resolves a method and concrete path.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, T> {
        let Some((methods, params)) = self.root.match_path(path) else {
            return Lookup::NotFound;
        };
        match methods.get(method) {
            Some(value) => Lookup::Found(Match { value, params }),
            None => Lookup::MethodNotAllowed(methods.allowed_methods()),
        }
    }

    /// Resolves a path regardless of method.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter<T>, Params)> {
        self.root.match_path(path)
    }

    /// Number of `insert` calls made.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if nothing was inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
