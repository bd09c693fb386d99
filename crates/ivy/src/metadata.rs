//! Immutable request metadata.
//!
//! [`Metadata`] is a string-keyed carrier attached to a request's
//! extensions. It is never mutated in place: [`Metadata::with_value`]
//! returns a new carrier that shares unchanged entries with the old one.
//! The router keeps the request's [`KeyValueStore`] under a reserved key so
//! the store survives a hop through code that only sees the request.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::FatalError;
use crate::store::KeyValueStore;
use crate::types::Request;

/// Metadata key under which the request's store is kept.
pub(crate) const STORE_KEY: &str = "ivy.ctx.kv";

type Value = Arc<dyn Any + Send + Sync>;

/// String-keyed values travelling with a request.
///
/// # Example
///
/// ```rust
/// use ivy::Metadata;
///
/// let base = Metadata::new();
/// let tagged = base.with_value("tenant", "acme");
///
/// assert!(base.value("tenant").is_none());
/// assert_eq!(tagged.value_as::<&str>("tenant"), Some(&"acme"));
/// ```
#[derive(Clone, Default)]
pub struct Metadata {
    entries: Arc<HashMap<String, Value>>,
}

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metadata attached to `request`, or empty metadata.
    #[must_use]
    pub fn of(request: &Request) -> Self {
        request
            .extensions()
            .get::<Self>()
            .cloned()
            .unwrap_or_default()
    }

    /// Attaches this metadata to `request`, replacing what was there.
    pub fn attach(self, request: &mut Request) {
        request.extensions_mut().insert(self);
    }

    /// Returns the value under `key`.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.entries.get(key).map(|v| &**v)
    }

    /// Returns the value under `key` if it has type `T`.
    #[must_use]
    pub fn value_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.value(key)?.downcast_ref::<T>()
    }

    /// Returns a copy of this metadata with `key` bound to `value`.
    #[must_use]
    pub fn with_value<V>(&self, key: impl Into<String>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        let mut entries = (*self.entries).clone();
        entries.insert(key.into(), Arc::new(value));
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recovers the store threaded through this metadata.
    ///
    /// Returns `Ok(None)` when no store has been attached yet and a
    /// [`FatalError`] when the reserved key holds something else.
    pub(crate) fn store(&self) -> Result<Option<KeyValueStore>, FatalError> {
        match self.value(STORE_KEY) {
            None => Ok(None),
            Some(value) => value
                .downcast_ref::<KeyValueStore>()
                .cloned()
                .map(Some)
                .ok_or(FatalError::CorruptStore { key: STORE_KEY }),
        }
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Metadata").field("keys", &keys).finish()
    }
}

/// Returns the store carried by `request`, creating and attaching a fresh
/// one if the request has none.
pub(crate) fn restore_store(request: &mut Request) -> Result<KeyValueStore, FatalError> {
    let metadata = Metadata::of(request);
    if let Some(store) = metadata.store()? {
        return Ok(store);
    }
    let store = KeyValueStore::new();
    metadata.with_value(STORE_KEY, store.clone()).attach(request);
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;

    fn request() -> Request {
        http::Request::new(Full::new(Bytes::new()))
    }

    #[test]
    fn test_with_value_does_not_mutate() {
        let base = Metadata::new().with_value("a", 1_u8);
        let extended = base.with_value("b", 2_u8);

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert_eq!(extended.value_as::<u8>("a"), Some(&1));
    }

    #[test]
    fn test_value_as_wrong_type() {
        let meta = Metadata::new().with_value("n", 1_u32);
        assert!(meta.value("n").is_some());
        assert_eq!(meta.value_as::<u64>("n"), None);
    }

    #[test]
    fn test_restore_creates_once() {
        let mut req = request();
        let first = restore_store(&mut req).unwrap();
        first.set("seen", true);

        let second = restore_store(&mut req).unwrap();
        assert!(first.same_store(&second));
        assert_eq!(second.get::<bool>("seen"), Some(true));
    }

    #[test]
    fn test_restore_rejects_foreign_value() {
        let mut req = request();
        Metadata::new()
            .with_value(STORE_KEY, "not a store")
            .attach(&mut req);

        assert_eq!(
            restore_store(&mut req).unwrap_err(),
            FatalError::CorruptStore { key: STORE_KEY }
        );
    }

    #[test]
    fn test_restore_keeps_other_entries() {
        let mut req = request();
        Metadata::new().with_value("tenant", "acme").attach(&mut req);
        restore_store(&mut req).unwrap();

        let meta = Metadata::of(&req);
        assert_eq!(meta.value_as::<&str>("tenant"), Some(&"acme"));
        assert!(meta.value(STORE_KEY).is_some());
    }
}
