use super::{CacheKey, Store};
use crate::{Result, Value};

use std::collections::HashMap;

/// The default unbounded base store.
#[derive(Default)]
pub struct PerpetualStore {
    map: HashMap<CacheKey, Value>,
}

impl PerpetualStore {
    pub fn new() -> PerpetualStore {
        PerpetualStore::default()
    }
}

impl Store for PerpetualStore {
    fn get(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: CacheKey, value: Value) -> Result<()> {
        self.map.insert(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        Ok(self.map.remove(key))
    }

    fn clear(&mut self) -> Result<()> {
        self.map.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
