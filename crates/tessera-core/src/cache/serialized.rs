use super::{CacheKey, Store};
use crate::{Error, Result, Value};

/// Stores entries serialized and deserializes them on read, so every reader
/// receives an isolated copy and cached values are immutable at rest.
pub struct SerializedStore {
    delegate: Box<dyn Store>,
}

impl SerializedStore {
    pub fn new(delegate: Box<dyn Store>) -> SerializedStore {
        SerializedStore { delegate }
    }
}

impl Store for SerializedStore {
    fn get(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        match self.delegate.get(key)? {
            None => Ok(None),
            Some(Value::String(serialized)) => {
                let value = serde_json::from_str(&serialized)
                    .map_err(|err| Error::cache(format!("cannot deserialize entry: {err}")))?;
                Ok(Some(value))
            }
            Some(other) => Err(Error::cache(format!(
                "serialized store holds a non-serialized entry: {other}"
            ))),
        }
    }

    fn put(&mut self, key: CacheKey, value: Value) -> Result<()> {
        let serialized = serde_json::to_string(&value)
            .map_err(|err| Error::cache(format!("cannot serialize entry: {err}")))?;
        self.delegate.put(key, Value::String(serialized))
    }

    fn remove(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        self.delegate.remove(key)
    }

    fn clear(&mut self) -> Result<()> {
        self.delegate.clear()
    }

    fn len(&self) -> usize {
        self.delegate.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::PerpetualStore;
    use super::*;

    #[test]
    fn readers_get_copies() {
        let mut store = SerializedStore::new(Box::new(PerpetualStore::new()));
        let mut key = CacheKey::new();
        key.update(Value::Long(1));

        let row = Value::List(vec![Value::Long(1), Value::String("ann".into())]);
        store.put(key.clone(), row.clone()).unwrap();

        let first = store.get(&key).unwrap().unwrap();
        let second = store.get(&key).unwrap().unwrap();
        assert_eq!(first, row);
        assert_eq!(second, row);
    }
}
