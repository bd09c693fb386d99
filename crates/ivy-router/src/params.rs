//! Ordered path parameter bindings.
//!
//! A successful match yields the parameters in the order their segments
//! appear in the pattern. Most routes bind at most a handful of names, so the
//! bindings live inline until the fifth one.

use smallvec::SmallVec;

const INLINE_BINDINGS: usize = 4;

/// Parameter bindings produced by a route match.
///
/// # Example
///
/// ```rust
/// use ivy_router::Params;
///
/// let mut params = Params::new();
/// params.push("org", "acme");
/// params.push("id", "42");
///
/// assert_eq!(params.get("id"), Some("42"));
/// assert_eq!(params.iter().next(), Some(("org", "acme")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    bindings: SmallVec<[(String, String); INLINE_BINDINGS]>,
}

impl Params {
    /// Creates an empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a binding.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.bindings.push((name.into(), value.into()));
    }

    /// Returns the value bound to `name`.
    ///
    /// When a name is bound twice the later binding wins.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if nothing was bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates bindings in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Drops every binding past `len`. Used when the matcher backtracks.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.bindings.truncate(len);
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}
