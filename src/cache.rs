//! Query response cache — bounded TTL + LRU store.
//!
//! Caches final cleaned answers keyed by the normalized query text so a
//! repeated identical query skips the provider fan-out entirely. The cache
//! is an explicit instance constructed with a capacity and TTL and injected
//! into the orchestrator; there is no process-wide global. Entries are lost
//! on restart — the cache is a performance optimization, not a correctness
//! dependency.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

/// Time source for TTL checks. Injectable so expiry is testable without
/// real waiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time source used in production.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced time source for simulating TTL expiry in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Access order, least-recently-used first. Every key in `entries`
    /// appears here exactly once.
    recency: Vec<String>,
}

/// Bounded TTL + LRU cache for final answers.
///
/// `get`/`put` take `&self` and serialize through an internal mutex, so a
/// single instance can be shared across concurrent requests. Two requests
/// racing on the same uncached key may both run the pipeline; the second
/// `put` simply replaces the first.
pub struct QueryCache {
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<CacheInner>,
}

impl QueryCache {
    /// Create a cache holding at most `capacity` entries, each served for
    /// at most `ttl` after insertion.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an injected time source.
    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            ttl,
            clock,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                recency: Vec::new(),
            }),
        }
    }

    /// Look up `key`. Returns the cached value and refreshes its recency,
    /// or `None` if the key is absent or its entry has outlived the TTL.
    /// Expired entries are evicted on access.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => now.duration_since(entry.inserted_at) >= self.ttl,
        };

        if expired {
            inner.entries.remove(key);
            inner.recency.retain(|k| k != key);
            debug!(key, "cache entry expired");
            return None;
        }

        // Mark most-recently-used.
        inner.recency.retain(|k| k != key);
        inner.recency.push(key.to_string());
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Insert `value` under `key` as the most-recently-used entry. An
    /// existing entry for the key is replaced, which resets both its
    /// recency and its TTL timestamp. Evicts from the least-recently-used
    /// end while over capacity.
    pub fn put(&self, key: &str, value: &str) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.entries.remove(key).is_some() {
            inner.recency.retain(|k| k != key);
        }

        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                inserted_at: now,
            },
        );
        inner.recency.push(key.to_string());

        while inner.entries.len() > self.capacity {
            let evicted = inner.recency.remove(0);
            inner.entries.remove(&evicted);
            debug!(key = %evicted, "cache entry evicted (over capacity)");
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.recency.clear();
    }

    /// Number of live entries (expired-but-unaccessed entries count until
    /// their next access evicts them).
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_manual_clock(
        capacity: usize,
        ttl_secs: u64,
    ) -> (QueryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = QueryCache::with_clock(
            capacity,
            Duration::from_secs(ttl_secs),
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn test_put_then_get() {
        let cache = QueryCache::new(10, Duration::from_secs(300));
        cache.put("k", "v");
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_get_missing() {
        let cache = QueryCache::new(10, Duration::from_secs(300));
        assert_eq!(cache.get("absent"), None);
    }

    #[test]
    fn test_ttl_expiry_evicts() {
        let (cache, clock) = cache_with_manual_clock(10, 300);
        cache.put("k", "v");

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get("k"), Some("v".to_string()));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k"), None);
        // The expired entry is gone, not just hidden.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_lru_only() {
        let cache = QueryCache::new(2, Duration::from_secs(300));
        cache.put("a", "1");
        cache.put("b", "2");
        cache.put("c", "3");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some("2".to_string()));
        assert_eq!(cache.get("c"), Some("3".to_string()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = QueryCache::new(2, Duration::from_secs(300));
        cache.put("a", "1");
        cache.put("b", "2");
        // Touch "a" so "b" becomes least-recently-used.
        cache.get("a");
        cache.put("c", "3");

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some("1".to_string()));
    }

    #[test]
    fn test_put_resets_recency_and_timestamp() {
        let (cache, clock) = cache_with_manual_clock(2, 300);
        cache.put("a", "1");
        clock.advance(Duration::from_secs(200));
        // Re-insert refreshes the timestamp, so the entry survives past
        // the original deadline.
        cache.put("a", "1b");
        clock.advance(Duration::from_secs(200));
        assert_eq!(cache.get("a"), Some("1b".to_string()));

        // Re-insert also makes the key most-recently-used.
        cache.put("b", "2");
        cache.put("a", "1c");
        cache.put("c", "3");
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some("1c".to_string()));
    }

    #[test]
    fn test_clear() {
        let cache = QueryCache::new(10, Duration::from_secs(300));
        cache.put("a", "1");
        cache.put("b", "2");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }
}
