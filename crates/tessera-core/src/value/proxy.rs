use super::Value;
use crate::ty::ValueKind;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A postponed nested-query fetch for one lazy property.
#[derive(Debug, Clone, PartialEq)]
pub struct LazyLoad {
    /// Fully-qualified id of the mapped statement to run.
    pub statement_id: String,
    /// Snapshot of the nested-query parameter taken at projection time.
    pub parameter: Value,
    /// Expected shape of the property: `List` collects all rows, anything
    /// else takes the single row (or null).
    pub kind: ValueKind,
}

/// Shared wrapper around a projected object that still has unloaded lazy
/// properties.
///
/// Clones alias the same cell: a load performed through one handle is
/// observed by every other handle, which is what makes results embedded in
/// several parents behave like one object.
#[derive(Clone)]
pub struct ProxyRef {
    inner: Arc<Mutex<ProxyInner>>,
}

struct ProxyInner {
    target: Value,
    loaders: IndexMap<String, LazyLoad>,
}

impl ProxyRef {
    pub fn new(target: Value, loaders: IndexMap<String, LazyLoad>) -> ProxyRef {
        ProxyRef {
            inner: Arc::new(Mutex::new(ProxyInner { target, loaders })),
        }
    }

    /// A clone of the wrapped object in its current state. Pending lazy
    /// properties are absent from the snapshot.
    pub fn snapshot(&self) -> Value {
        self.inner.lock().target.clone()
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.inner.lock().target.property(name)
    }

    /// Returns `true` while `name` has a registered, unloaded loader.
    pub fn is_pending(&self, name: &str) -> bool {
        self.inner.lock().loaders.contains_key(name)
    }

    /// Property names that still have unloaded loaders.
    pub fn pending(&self) -> Vec<String> {
        self.inner.lock().loaders.keys().cloned().collect()
    }

    pub fn loader(&self, name: &str) -> Option<LazyLoad> {
        self.inner.lock().loaders.get(name).cloned()
    }

    /// Stores the loaded value and retires the loader.
    pub fn complete(&self, name: &str, value: Value) {
        let mut inner = self.inner.lock();
        inner.loaders.shift_remove(name);
        if let Value::Object(map) = &mut inner.target {
            map.insert(name.to_string(), value);
        }
    }

    pub fn set_property(&self, name: &str, value: Value) {
        let mut inner = self.inner.lock();
        if let Value::Object(map) = &mut inner.target {
            map.insert(name.to_string(), value);
        }
    }
}

impl PartialEq for ProxyRef {
    fn eq(&self, other: &ProxyRef) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        self.snapshot() == other.snapshot()
    }
}

impl core::fmt::Debug for ProxyRef {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ProxyRef")
            .field("target", &inner.target)
            .field("pending", &inner.loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Serialize for ProxyRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProxyRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<ProxyRef, D::Error> {
        let target = Value::deserialize(deserializer)?;
        Ok(ProxyRef::new(target, IndexMap::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Value {
        let mut map = super::super::ValueObject::new();
        map.insert("id".to_string(), Value::Long(1));
        Value::Object(map)
    }

    #[test]
    fn clones_share_loads() {
        let mut loaders = IndexMap::new();
        loaders.insert(
            "author".to_string(),
            LazyLoad {
                statement_id: "app.AuthorMapper.findById".to_string(),
                parameter: Value::Long(9),
                kind: ValueKind::Object,
            },
        );
        let proxy = ProxyRef::new(user(), loaders);
        let alias = proxy.clone();

        assert!(alias.is_pending("author"));
        proxy.complete("author", Value::String("ann".into()));

        assert!(!alias.is_pending("author"));
        assert_eq!(alias.property("author"), Some(Value::String("ann".into())));
    }

    #[test]
    fn snapshot_comparison() {
        let a = ProxyRef::new(user(), IndexMap::new());
        let b = ProxyRef::new(user(), IndexMap::new());
        assert_eq!(a, b);
    }
}
