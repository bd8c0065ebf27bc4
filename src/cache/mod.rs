//! Local read cache.
//!
//! A capacity-bounded LRU cache in front of the backend. The cache is a
//! non-authoritative read accelerator: the transaction layer never reads
//! through it, and every mutating operation invalidates the key it touched
//! so read-after-write stays coherent within one process.
//!
//! # Thread Safety
//!
//! Uses `RwLock` for interior mutability. Lock poisoning is handled with
//! fail-open semantics: a poisoned lock reads as a miss and skips writes,
//! since serving no cached value is always safe.

use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size and traffic statistics for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Current entry count.
    pub size: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Lookup hits.
    pub hits: u64,
    /// Lookup misses.
    pub misses: u64,
    /// Entries evicted under the LRU policy.
    pub evictions: u64,
}

/// Bounded LRU cache keyed by fully qualified backend keys.
pub struct LocalCache {
    entries: RwLock<LruCache<String, Value>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LocalCache {
    /// Creates a cache bounded to `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    #[must_use]
    #[allow(clippy::expect_used)] // Documented panic for invalid input
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).expect("cache capacity must be > 0");
        Self {
            entries: RwLock::new(LruCache::new(cap)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up a key, refreshing its recency on hit.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let Ok(mut entries) = self.entries.write() else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        match entries.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    /// Inserts a value, evicting the least-recently-used entry at capacity.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() == self.capacity {
                let key: String = key.into();
                if !entries.contains(&key) {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                entries.put(key, value);
            } else {
                entries.put(key.into(), value);
            }
        }
    }

    /// Removes a key. Mutating services call this for every key they
    /// change so later reads see the backend's version.
    pub fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.pop(key);
        }
    }

    /// Empties the cache.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Returns size and traffic statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let size = self.entries.read().map_or(0, |entries| entries.len());
        CacheStats {
            size,
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_insert_invalidate() {
        let cache = LocalCache::new(4);
        assert_eq!(cache.get("k"), None);
        cache.insert("k", json!({"a": 1}));
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = LocalCache::new(2);
        cache.insert("a", json!(1));
        cache.insert("b", json!(2));
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        cache.insert("c", json!(3));

        assert!(cache.get("a").is_some());
        assert_eq!(cache.get("b"), None);
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().size, 2);
    }
}
