use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::rc::Rc;

use crate::KeyValueStore;
use crate::error::{EngineError, EngineResult};

/// Read a typed record. Absent and undecodable records both come back as `None`.
///
/// # Errors
///
/// Returns an error only if the backing store itself fails.
pub fn read_json<T, S>(store: &S, key: &str) -> EngineResult<Option<T>>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let Some(value) = store
        .get(key)
        .map_err(|err| EngineError::storage(key, err))?
    else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) => {
            warn!("discarding unreadable record `{key}`: {err}");
            Ok(None)
        }
    }
}

/// Write a typed record.
///
/// # Errors
///
/// Returns an error if the value cannot be encoded or the store fails.
pub fn write_json<T, S>(store: &S, key: &str, value: &T) -> EngineResult<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let encoded = serde_json::to_value(value).map_err(|source| EngineError::Encode {
        key: key.to_string(),
        source,
    })?;
    store
        .set(key, encoded)
        .map_err(|err| EngineError::storage(key, err))
}

/// Remove a record.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn remove_key<S>(store: &S, key: &str) -> EngineResult<()>
where
    S: KeyValueStore + ?Sized,
{
    store
        .remove(key)
        .map_err(|err| EngineError::storage(key, err))
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<Value>, Self::Error> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), Self::Error> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Scopes every key of an inner store under a per-user namespace.
#[derive(Debug, Clone)]
pub struct NamespacedStore<S> {
    inner: S,
    namespace: String,
}

impl<S: KeyValueStore> NamespacedStore<S> {
    pub fn new(inner: S, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }
}

impl<S: KeyValueStore> KeyValueStore for NamespacedStore<S> {
    type Error = S::Error;

    fn get(&self, key: &str) -> Result<Option<Value>, Self::Error> {
        self.inner.get(&self.scoped(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), Self::Error> {
        self.inner.set(&self.scoped(key), value)
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.inner.remove(&self.scoped(key))
    }
}
