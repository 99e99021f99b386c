use super::{Cache, CacheKey};
use crate::{Result, Value};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Session-scoped overlay on a shared region: writes stage locally and only
/// reach the region at commit, so other sessions never observe uncommitted
/// rows. Misses are tracked so blocked keys can be released on rollback.
pub struct TransactionalCache {
    delegate: Arc<Cache>,
    clear_on_commit: bool,
    entries_to_add: HashMap<CacheKey, Value>,
    entries_missed: HashSet<CacheKey>,
}

impl TransactionalCache {
    pub fn new(delegate: Arc<Cache>) -> TransactionalCache {
        TransactionalCache {
            delegate,
            clear_on_commit: false,
            entries_to_add: HashMap::new(),
            entries_missed: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.delegate.id()
    }

    pub fn get(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        let value = self.delegate.get(key)?;
        if value.is_none() {
            self.entries_missed.insert(key.clone());
        }
        // A pending clear hides region values from this session.
        if self.clear_on_commit {
            return Ok(None);
        }
        Ok(value)
    }

    pub fn put(&mut self, key: CacheKey, value: Value) {
        self.entries_to_add.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add.clear();
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.clear_on_commit {
            self.delegate.clear()?;
        }
        for (key, value) in self.entries_to_add.drain() {
            self.entries_missed.remove(&key);
            self.delegate.put(key, value)?;
        }
        // Release any still-blocked keys this session missed on.
        for key in self.entries_missed.drain() {
            self.delegate.release(&key);
        }
        self.clear_on_commit = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        for key in self.entries_missed.drain() {
            self.delegate.release(&key);
        }
        self.entries_to_add.clear();
        self.clear_on_commit = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(part: i64) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(Value::Long(part));
        key
    }

    #[test]
    fn writes_stage_until_commit() {
        let region = Arc::new(Cache::builder("app.UserMapper").build());
        let mut tx = TransactionalCache::new(region.clone());

        tx.put(key(1), Value::Long(1));
        assert_eq!(region.get(&key(1)).unwrap(), None);

        tx.commit().unwrap();
        assert_eq!(region.get(&key(1)).unwrap(), Some(Value::Long(1)));
    }

    #[test]
    fn pending_clear_hides_region_values() {
        let region = Arc::new(Cache::builder("app.UserMapper").build());
        region.put(key(1), Value::Long(1)).unwrap();

        let mut tx = TransactionalCache::new(region.clone());
        tx.clear();
        assert_eq!(tx.get(&key(1)).unwrap(), None);

        tx.commit().unwrap();
        assert!(region.is_empty());
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let region = Arc::new(Cache::builder("app.UserMapper").build());
        let mut tx = TransactionalCache::new(region.clone());

        tx.put(key(1), Value::Long(1));
        tx.rollback().unwrap();
        tx.commit().unwrap();
        assert_eq!(region.get(&key(1)).unwrap(), None);
    }
}
