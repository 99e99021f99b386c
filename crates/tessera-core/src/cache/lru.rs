use super::{CacheKey, Store};
use crate::{Result, Value};

use indexmap::IndexSet;

/// Bounds the delegate by access recency: reads refresh a key, inserts over
/// capacity evict the least recently touched key.
pub struct LruStore {
    delegate: Box<dyn Store>,
    capacity: usize,
    touched: IndexSet<CacheKey>,
}

impl LruStore {
    pub fn new(delegate: Box<dyn Store>, capacity: usize) -> LruStore {
        LruStore {
            delegate,
            capacity: capacity.max(1),
            touched: IndexSet::new(),
        }
    }

    fn touch(&mut self, key: &CacheKey) {
        self.touched.shift_remove(key);
        self.touched.insert(key.clone());
    }
}

impl Store for LruStore {
    fn get(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        let value = self.delegate.get(key)?;
        if value.is_some() {
            self.touch(key);
        }
        Ok(value)
    }

    fn put(&mut self, key: CacheKey, value: Value) -> Result<()> {
        self.delegate.put(key.clone(), value)?;
        self.touch(&key);
        while self.touched.len() > self.capacity {
            let eldest = self.touched.shift_remove_index(0).expect("non-empty");
            self.delegate.remove(&eldest)?;
        }
        Ok(())
    }

    fn remove(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        self.touched.shift_remove(key);
        self.delegate.remove(key)
    }

    fn clear(&mut self) -> Result<()> {
        self.touched.clear();
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

    fn key(part: i64) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(Value::Long(part));
        key
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut store = LruStore::new(Box::new(PerpetualStore::new()), 2);
        store.put(key(1), Value::Long(1)).unwrap();
        store.put(key(2), Value::Long(2)).unwrap();

        // Touch 1 so 2 becomes the eviction candidate.
        assert!(store.get(&key(1)).unwrap().is_some());
        store.put(key(3), Value::Long(3)).unwrap();

        assert!(store.get(&key(2)).unwrap().is_none());
        assert!(store.get(&key(1)).unwrap().is_some());
        assert!(store.get(&key(3)).unwrap().is_some());
    }
}
