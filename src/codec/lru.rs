//! Capacity-bounded LRU cache for per-type introspection metadata.
//!
//! Values are handed out as `Arc`s so repeated lookups return the identical
//! cached instance until eviction; eviction only ever costs the caller a
//! one-time recompute.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// Least-recently-used cache with a fixed capacity.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
    // Monotonic recency stamp; larger = more recently used.
    tick: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: Arc<V>,
    recency: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// Panics if `capacity` is zero; a zero-sized cache can satisfy neither
    /// the identity nor the bound invariant.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LruCache capacity must be non-zero");
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|entry| {
            entry.recency = tick;
            Arc::clone(&entry.value)
        })
    }

    /// Look up `key`, computing and inserting the value on a miss.
    ///
    /// Inserting into a full cache evicts exactly the least-recently-used
    /// entry first, so `len() <= capacity` always holds.
    pub fn get_or_insert(&mut self, key: K, compute: impl FnOnce() -> V) -> Arc<V> {
        if let Some(value) = self.get(&key) {
            return value;
        }
        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        let value = Arc::new(compute());
        self.tick += 1;
        self.entries.insert(
            key,
            Entry {
                value: Arc::clone(&value),
                recency: self.tick,
            },
        );
        value
    }

    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.recency)
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

/// Thread-safe LRU shared across encoder invocations on different component
/// pipelines. Lock scope is a single lookup, never a compute-under-lock for
/// hits.
#[derive(Debug)]
pub struct SharedLru<K, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Eq + Hash + Clone, V> SharedLru<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.lock().get(key)
    }

    pub fn get_or_insert(&self, key: K, compute: impl FnOnce() -> V) -> Arc<V> {
        self.inner.lock().get_or_insert(key, compute)
    }
}
