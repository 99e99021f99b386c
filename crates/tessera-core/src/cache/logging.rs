use super::{CacheKey, Store};
use crate::{Result, Value};

use tracing::debug;

/// Tracks request/hit counts and logs the running hit ratio on reads.
pub struct LoggingStore {
    id: String,
    delegate: Box<dyn Store>,
    requests: u64,
    hits: u64,
}

impl LoggingStore {
    pub fn new(id: &str, delegate: Box<dyn Store>) -> LoggingStore {
        LoggingStore {
            id: id.to_string(),
            delegate,
            requests: 0,
            hits: 0,
        }
    }

    fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}

impl Store for LoggingStore {
    fn get(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        self.requests += 1;
        let value = self.delegate.get(key)?;
        if value.is_some() {
            self.hits += 1;
        }
        debug!(
            cache = %self.id,
            hit_ratio = self.hit_ratio(),
            "cache lookup"
        );
        Ok(value)
    }

    fn put(&mut self, key: CacheKey, value: Value) -> Result<()> {
        self.delegate.put(key, value)
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
