mod cache_key;
pub use cache_key::CacheKey;

mod fifo;
pub use fifo::FifoStore;

mod logging;
pub use logging::LoggingStore;

mod lru;
pub use lru::LruStore;

mod perpetual;
pub use perpetual::PerpetualStore;

mod scheduled;
pub use scheduled::ScheduledStore;

mod serialized;
pub use serialized::SerializedStore;

mod transactional;
pub use transactional::TransactionalCache;

use crate::{Error, Result, Value};

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Backing storage behind a cache region. Implementations are single-owner
/// (`&mut self`); the region wraps the chain in a mutex, which realizes the
/// synchronized decorator.
pub trait Store: Send {
    fn get(&mut self, key: &CacheKey) -> Result<Option<Value>>;
    fn put(&mut self, key: CacheKey, value: Value) -> Result<()>;
    fn remove(&mut self, key: &CacheKey) -> Result<Option<Value>>;
    fn clear(&mut self) -> Result<()>;
    fn len(&self) -> usize;
}

/// A shared cache region: a decorator chain under a mutex, optionally
/// fronted by per-key blocking locks so only one session recomputes a
/// missing key.
pub struct Cache {
    id: String,
    store: Mutex<Box<dyn Store>>,
    blocking: Option<BlockingLocks>,
}

struct BlockingLocks {
    timeout: Option<Duration>,
    latches: Mutex<HashMap<CacheKey, Arc<KeyLatch>>>,
}

#[derive(Default)]
struct KeyLatch {
    held: Mutex<bool>,
    cond: Condvar,
}

impl Cache {
    pub fn builder(id: impl Into<String>) -> CacheBuilder {
        CacheBuilder {
            id: id.into(),
            eviction: EvictionPolicy::Lru,
            size: 1024,
            flush_interval: None,
            read_write: false,
            blocking: false,
            blocking_timeout: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reads a key. Under blocking, a miss leaves the calling session
    /// holding the key's latch; the subsequent `put` (or `release`)
    /// releases it, and other sessions asking for the same key wait here.
    pub fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        if let Some(blocking) = &self.blocking {
            blocking.acquire(key)?;
        }
        let value = self.store.lock().get(key)?;
        if value.is_some() {
            if let Some(blocking) = &self.blocking {
                blocking.release(key);
            }
        }
        Ok(value)
    }

    pub fn put(&self, key: CacheKey, value: Value) -> Result<()> {
        self.store.lock().put(key.clone(), value)?;
        if let Some(blocking) = &self.blocking {
            blocking.release(&key);
        }
        Ok(())
    }

    /// Releases a blocked key without storing a value (failure path).
    pub fn release(&self, key: &CacheKey) {
        if let Some(blocking) = &self.blocking {
            blocking.release(key);
        }
    }

    pub fn remove(&self, key: &CacheKey) -> Result<Option<Value>> {
        let removed = self.store.lock().remove(key)?;
        if let Some(blocking) = &self.blocking {
            blocking.release(key);
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.lock().clear()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::fmt::Debug for Cache {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Cache")
            .field("id", &self.id)
            .field("blocking", &self.blocking.is_some())
            .finish()
    }
}

impl BlockingLocks {
    fn acquire(&self, key: &CacheKey) -> Result<()> {
        let latch = {
            let mut latches = self.latches.lock();
            latches.entry(key.clone()).or_default().clone()
        };

        let mut held = latch.held.lock();
        while *held {
            match self.timeout {
                Some(timeout) => {
                    if latch.cond.wait_for(&mut held, timeout).timed_out() {
                        return Err(Error::cache(format!(
                            "timed out waiting for lock on cache key {key}"
                        )));
                    }
                }
                None => latch.cond.wait(&mut held),
            }
        }
        *held = true;
        Ok(())
    }

    fn release(&self, key: &CacheKey) {
        let latch = {
            let latches = self.latches.lock();
            latches.get(key).cloned()
        };
        if let Some(latch) = latch {
            let mut held = latch.held.lock();
            *held = false;
            latch.cond.notify_all();
        }
    }
}

/// Eviction policy for the region's bounded store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    Lru,
    Fifo,
}

impl EvictionPolicy {
    /// Resolves a policy from its document spelling. Reference-counted
    /// policies have no Rust analog and degrade to LRU with a warning.
    pub fn parse(name: &str) -> Result<EvictionPolicy> {
        Ok(match name.to_ascii_uppercase().as_str() {
            "LRU" => EvictionPolicy::Lru,
            "FIFO" => EvictionPolicy::Fifo,
            "SOFT" | "WEAK" => {
                tracing::warn!(policy = name, "eviction policy unsupported, using LRU");
                EvictionPolicy::Lru
            }
            other => return Err(Error::parse(format!("unknown eviction policy `{other}`"))),
        })
    }
}

/// Assembles a region's decorator chain. Outermost to innermost:
/// blocking (optional) → synchronized → logging → serialized (optional) →
/// scheduled flush (optional) → eviction → base store.
pub struct CacheBuilder {
    id: String,
    eviction: EvictionPolicy,
    size: usize,
    flush_interval: Option<Duration>,
    read_write: bool,
    blocking: bool,
    blocking_timeout: Option<Duration>,
}

impl CacheBuilder {
    pub fn eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn size(mut self, size: Option<usize>) -> Self {
        if let Some(size) = size {
            self.size = size;
        }
        self
    }

    pub fn flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Serializes entries so readers get isolated copies.
    pub fn read_write(mut self, read_write: bool) -> Self {
        self.read_write = read_write;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn blocking_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    pub fn build(self) -> Cache {
        let mut store: Box<dyn Store> = Box::new(PerpetualStore::new());
        store = match self.eviction {
            EvictionPolicy::Lru => Box::new(LruStore::new(store, self.size)),
            EvictionPolicy::Fifo => Box::new(FifoStore::new(store, self.size)),
        };
        if let Some(interval) = self.flush_interval {
            store = Box::new(ScheduledStore::new(store, interval));
        }
        if self.read_write {
            store = Box::new(SerializedStore::new(store));
        }
        store = Box::new(LoggingStore::new(&self.id, store));

        Cache {
            id: self.id,
            store: Mutex::new(store),
            blocking: self.blocking.then(|| BlockingLocks {
                timeout: self.blocking_timeout,
                latches: Mutex::new(HashMap::new()),
            }),
        }
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
    fn round_trip() {
        let cache = Cache::builder("app.UserMapper").build();
        cache.put(key(1), Value::String("row".into())).unwrap();
        assert_eq!(
            cache.get(&key(1)).unwrap(),
            Some(Value::String("row".into()))
        );
        assert_eq!(cache.get(&key(2)).unwrap(), None);
    }

    #[test]
    fn clear_empties_the_region() {
        let cache = Cache::builder("app.UserMapper").build();
        cache.put(key(1), Value::Long(1)).unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn serialized_regions_round_trip_values() {
        let cache = Cache::builder("app.UserMapper").read_write(true).build();
        let row = Value::List(vec![Value::Long(1), Value::String("ann".into())]);
        cache.put(key(1), row.clone()).unwrap();
        assert_eq!(cache.get(&key(1)).unwrap(), Some(row));
    }

    #[test]
    fn blocking_miss_is_released_by_put() {
        let cache = Arc::new(
            Cache::builder("app.UserMapper")
                .blocking(true)
                .blocking_timeout(Some(Duration::from_secs(5)))
                .build(),
        );

        // First reader misses and holds the latch.
        assert_eq!(cache.get(&key(1)).unwrap(), None);

        let contender = {
            let cache = cache.clone();
            std::thread::spawn(move || cache.get(&key(1)).unwrap())
        };

        // The put releases the latch; the contender then sees the value.
        cache.put(key(1), Value::Long(42)).unwrap();
        assert_eq!(contender.join().unwrap(), Some(Value::Long(42)));
    }
}
