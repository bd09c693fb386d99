//! Per-path method table.
//!
//! [`MethodRouter`] holds the values registered for one path pattern, keyed
//! by HTTP method. Verbs are not a fixed enumeration: any token accepted by
//! [`http::Method`] can be registered, including extension methods such as
//! `PURGE` or `PROPFIND`. A path may additionally carry a method-agnostic
//! entry used when no verb-specific entry exists.

use http::Method;
use smallvec::SmallVec;

/// Values registered for a single path, keyed by method.
///
/// # Example
///
/// ```rust
/// use ivy_router::MethodRouter;
/// use http::Method;
///
/// let mut methods = MethodRouter::new();
/// methods.insert(Method::GET, "list");
/// methods.insert(Method::from_bytes(b"PURGE").unwrap(), "purge");
///
/// assert_eq!(methods.get(&Method::GET), Some(&"list"));
/// assert_eq!(methods.get(&Method::from_bytes(b"PURGE").unwrap()), Some(&"purge"));
/// assert_eq!(methods.get(&Method::POST), None);
/// ```
#[derive(Debug, Clone)]
pub struct MethodRouter<T> {
    by_method: SmallVec<[(Method, T); 4]>,
    any: Option<T>,
}

impl<T> Default for MethodRouter<T> {
    fn default() -> Self {
        Self {
            by_method: SmallVec::new(),
            any: None,
        }
    }
}

impl<T> MethodRouter<T> {
    /// Creates an empty method table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` for `method`, replacing any earlier registration
    /// for the same method.
    pub fn insert(&mut self, method: Method, value: T) {
        if let Some(slot) = self.by_method.iter_mut().find(|(m, _)| *m == method) {
            slot.1 = value;
        } else {
            self.by_method.push((method, value));
        }
    }

    /// Registers a value that answers every method without its own entry.
    pub fn insert_any(&mut self, value: T) {
        self.any = Some(value);
    }

    /// Resolves the value for `method`.
    ///
    /// Lookup order: the exact method, then `GET` when asked for `HEAD`,
    /// then the method-agnostic entry.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<&T> {
        self.exact(method)
            .or_else(|| {
                if *method == Method::HEAD {
                    self.exact(&Method::GET)
                } else {
                    None
                }
            })
            .or(self.any.as_ref())
    }

    fn exact(&self, method: &Method) -> Option<&T> {
        self.by_method
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, v)| v)
    }

    /// Returns true if a method-agnostic entry is registered.
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.any.is_some()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty() && self.any.is_none()
    }

    /// Methods with a verb-specific entry, in registration order.
    ///
    /// `HEAD` is reported alongside `GET` because `GET` entries answer it.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.by_method.iter().map(|(m, _)| m.clone()).collect();
        if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
            methods.push(Method::HEAD);
        }
        methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(name: &str) -> Method {
        Method::from_bytes(name.as_bytes()).unwrap()
    }

    #[test]
    fn test_empty() {
        let methods: MethodRouter<u8> = MethodRouter::new();
        assert!(methods.is_empty());
        assert!(methods.allowed_methods().is_empty());
    }

    #[test]
    fn test_insert_replaces_same_method() {
        let mut methods = MethodRouter::new();
        methods.insert(Method::GET, 1);
        methods.insert(Method::GET, 2);
        assert_eq!(methods.get(&Method::GET), Some(&2));
        assert_eq!(methods.allowed_methods(), vec![Method::GET, Method::HEAD]);
    }

    #[test]
    fn test_custom_verbs() {
        let mut methods = MethodRouter::new();
        methods.insert(custom("PURGE"), "purge");
        methods.insert(custom("REPORT"), "report");

        assert_eq!(methods.get(&custom("PURGE")), Some(&"purge"));
        assert_eq!(methods.get(&custom("REPORT")), Some(&"report"));
        assert_eq!(methods.get(&Method::GET), None);
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let mut methods = MethodRouter::new();
        methods.insert(Method::GET, "get");
        assert_eq!(methods.get(&Method::HEAD), Some(&"get"));

        methods.insert(Method::HEAD, "head");
        assert_eq!(methods.get(&Method::HEAD), Some(&"head"));
    }

    #[test]
    fn test_any_is_the_last_resort() {
        let mut methods = MethodRouter::new();
        methods.insert_any("any");
        methods.insert(Method::POST, "post");

        assert!(methods.has_any());
        assert_eq!(methods.get(&Method::POST), Some(&"post"));
        assert_eq!(methods.get(&Method::DELETE), Some(&"any"));
        assert_eq!(methods.get(&custom("PATCHY")), Some(&"any"));
    }

    #[test]
    fn test_allowed_methods_registration_order() {
        let mut methods = MethodRouter::new();
        methods.insert(Method::DELETE, 0);
        methods.insert(Method::POST, 0);
        assert_eq!(methods.allowed_methods(), vec![Method::DELETE, Method::POST]);
    }
}
