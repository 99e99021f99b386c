use super::{CacheKey, Store};
use crate::{Result, Value};

use std::collections::VecDeque;

/// Bounds the delegate by insertion order.
pub struct FifoStore {
    delegate: Box<dyn Store>,
    capacity: usize,
    order: VecDeque<CacheKey>,
}

impl FifoStore {
    pub fn new(delegate: Box<dyn Store>, capacity: usize) -> FifoStore {
        FifoStore {
            delegate,
            capacity: capacity.max(1),
            order: VecDeque::new(),
        }
    }
}

impl Store for FifoStore {
    fn get(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        self.delegate.get(key)
    }

    fn put(&mut self, key: CacheKey, value: Value) -> Result<()> {
        if !self.order.contains(&key) {
            self.order.push_back(key.clone());
        }
        self.delegate.put(key, value)?;
        while self.order.len() > self.capacity {
            let eldest = self.order.pop_front().expect("non-empty");
            self.delegate.remove(&eldest)?;
        }
        Ok(())
    }

    fn remove(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        self.order.retain(|queued| queued != key);
        self.delegate.remove(key)
    }

    fn clear(&mut self) -> Result<()> {
        self.order.clear();
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
    fn evicts_in_insertion_order() {
        let mut store = FifoStore::new(Box::new(PerpetualStore::new()), 2);
        store.put(key(1), Value::Long(1)).unwrap();
        store.put(key(2), Value::Long(2)).unwrap();

        // Unlike LRU, reading does not protect the oldest entry.
        assert!(store.get(&key(1)).unwrap().is_some());
        store.put(key(3), Value::Long(3)).unwrap();

        assert!(store.get(&key(1)).unwrap().is_none());
        assert!(store.get(&key(2)).unwrap().is_some());
    }
}
