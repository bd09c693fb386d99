//! Per-request key-value store.
//!
//! A [`KeyValueStore`] is a handle: cloning it yields another reference to
//! the same map. The router creates one store per request and threads it
//! through request metadata, so a mounted router, or any code that rebuilds
//! a [`Context`](crate::Context) from the request, sees the values written
//! upstream and upstream sees values written downstream.
//!
//! The map is allocated on first write.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

type Value = Arc<dyn Any + Send + Sync>;

/// Why [`KeyValueStore::lookup`] produced no value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// Nothing is stored under the key.
    #[error("no value stored under `{0}`")]
    Missing(String),
    /// A value is stored under the key, but not of the requested type.
    #[error("value stored under `{key}` is not a `{expected}`")]
    TypeMismatch {
        /// The key looked up.
        key: String,
        /// Name of the requested type.
        expected: &'static str,
    },
}

/// Request-scoped map from string keys to values of any type.
///
/// # Example
///
/// ```rust
/// use ivy::KeyValueStore;
///
/// let store = KeyValueStore::new();
/// let shared = store.clone();
///
/// store.set("user", String::from("ada"));
/// assert_eq!(shared.get::<String>("user").as_deref(), Some("ada"));
/// assert_eq!(shared.get::<u64>("user"), None);
/// ```
#[derive(Clone, Default)]
pub struct KeyValueStore {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl KeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<V>(&self, key: impl Into<String>, value: V)
    where
        V: Any + Send + Sync,
    {
        self.entries.lock().insert(key.into(), Arc::new(value));
    }

    /// Returns a clone of the value under `key` if it has type `V`.
    #[must_use]
    pub fn get<V>(&self, key: &str) -> Option<V>
    where
        V: Any + Clone,
    {
        self.lookup(key).ok()
    }

    /// Like [`get`](Self::get), but tells a missing key apart from a value
    /// of another type.
    pub fn lookup<V>(&self, key: &str) -> Result<V, LookupError>
    where
        V: Any + Clone,
    {
        let value = self
            .entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| LookupError::Missing(key.to_string()))?;
        value
            .downcast_ref::<V>()
            .cloned()
            .ok_or_else(|| LookupError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<V>(),
            })
    }

    /// Returns the shared value under `key` without cloning it.
    #[must_use]
    pub fn get_arc<V>(&self, key: &str) -> Option<Arc<V>>
    where
        V: Any + Send + Sync,
    {
        let value = self.entries.lock().get(key).cloned()?;
        value.downcast::<V>().ok()
    }

    /// Returns true if anything is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Removes the value under `key`. Returns true if one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Stored keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns true if both handles refer to the same map.
    #[must_use]
    pub fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        f.debug_struct("KeyValueStore").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let store = KeyValueStore::new();
        store.set("count", 3_u32);
        assert_eq!(store.get::<u32>("count"), Some(3));
    }

    #[test]
    fn test_last_write_wins() {
        let store = KeyValueStore::new();
        store.set("k", 1_i64);
        store.set("k", "now a string");
        assert_eq!(store.get::<i64>("k"), None);
        assert_eq!(store.get::<&str>("k"), Some("now a string"));
    }

    #[test]
    fn test_lookup_distinguishes_missing_and_mismatch() {
        let store = KeyValueStore::new();
        store.set("n", 1_u8);

        assert_eq!(
            store.lookup::<u8>("absent"),
            Err(LookupError::Missing("absent".into()))
        );
        assert!(matches!(
            store.lookup::<String>("n"),
            Err(LookupError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_clones_share_entries() {
        let store = KeyValueStore::new();
        let other = store.clone();
        other.set("from-clone", true);

        assert!(store.contains("from-clone"));
        assert!(store.same_store(&other));
        assert!(!store.same_store(&KeyValueStore::new()));
    }

    #[test]
    fn test_remove_and_len() {
        let store = KeyValueStore::new();
        assert!(store.is_empty());
        store.set("a", 1);
        store.set("b", 2);
        assert_eq!(store.len(), 2);
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn test_get_arc() {
        #[derive(Debug, PartialEq)]
        struct Session {
            id: u32,
        }

        let store = KeyValueStore::new();
        store.set("session", Session { id: 9 });
        assert_eq!(store.get_arc::<Session>("session").map(|s| s.id), Some(9));
    }

    #[test]
    fn test_debug_lists_keys() {
        let store = KeyValueStore::new();
        store.set("b", 1);
        store.set("a", 1);
        assert_eq!(format!("{store:?}"), r#"KeyValueStore { keys: ["a", "b"] }"#);
    }
}
