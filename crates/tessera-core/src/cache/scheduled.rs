use super::{CacheKey, Store};
use crate::{Result, Value};

use std::time::{Duration, Instant};

/// Clears the delegate whenever the flush interval has elapsed since the
/// last clear, checked on every operation.
pub struct ScheduledStore {
    delegate: Box<dyn Store>,
    interval: Duration,
    last_clear: Instant,
}

impl ScheduledStore {
    pub fn new(delegate: Box<dyn Store>, interval: Duration) -> ScheduledStore {
        ScheduledStore {
            delegate,
            interval,
            last_clear: Instant::now(),
        }
    }

    fn flush_if_due(&mut self) -> Result<()> {
        if self.last_clear.elapsed() >= self.interval {
            self.clear()?;
        }
        Ok(())
    }
}

impl Store for ScheduledStore {
    fn get(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        self.flush_if_due()?;
        self.delegate.get(key)
    }

    fn put(&mut self, key: CacheKey, value: Value) -> Result<()> {
        self.flush_if_due()?;
        self.delegate.put(key, value)
    }

    fn remove(&mut self, key: &CacheKey) -> Result<Option<Value>> {
        self.flush_if_due()?;
        self.delegate.remove(key)
    }

    fn clear(&mut self) -> Result<()> {
        self.last_clear = Instant::now();
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
    fn zero_interval_flushes_every_operation() {
        let mut store = ScheduledStore::new(Box::new(PerpetualStore::new()), Duration::ZERO);
        let mut key = CacheKey::new();
        key.update(Value::Long(1));

        store.put(key.clone(), Value::Long(1)).unwrap();
        assert_eq!(store.get(&key).unwrap(), None);
    }

    #[test]
    fn long_interval_keeps_entries() {
        let mut store =
            ScheduledStore::new(Box::new(PerpetualStore::new()), Duration::from_secs(3600));
        let mut key = CacheKey::new();
        key.update(Value::Long(1));

        store.put(key.clone(), Value::Long(1)).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(Value::Long(1)));
    }
}
