//! TTL-bound response cache.
//!
//! The cache maps a request fingerprint to the bytes a previous
//! invocation produced, valid until its expiry. It is a performance
//! cache, not a single-flight barrier: parallel computations of the same
//! response on a cold key are expected, and the last writer wins.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::metrics::ResponseCacheStats;

struct CachedEntry {
    data: Bytes,
    expires_at: Instant,
}

/// Fingerprint-keyed TTL store of instrument outputs.
///
/// # Concurrency
///
/// `get` is non-blocking across distinct keys (sharded map, read guards).
/// `set` serializes on the insertion-order queue; expired entries are
/// dropped lazily when a lookup finds them.
pub struct ResponseCache {
    entries: DashMap<String, CachedEntry>,
    /// Inserted keys in order; its length never exceeds capacity, which
    /// bounds the live entries beneath it.
    order: Mutex<VecDeque<String>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` responses.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached response, honoring expiry.
    ///
    /// An expired entry counts as a miss and is removed on the way out.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let live = match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.data.clone()),
            _ => None,
        };

        match live {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(data)
            }
            None => {
                self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace a response under `key` for `ttl`.
    ///
    /// A zero TTL means "do not cache" and the call is a no-op. Any
    /// eviction needed to stay within capacity happens before returning.
    pub fn set(&self, key: &str, data: Bytes, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let entry = CachedEntry {
            data,
            expires_at: Instant::now() + ttl,
        };

        // Make room before inserting so a stale key of our own in the
        // order queue can never evict the entry we are about to store.
        let mut order = self.order.lock();
        if !self.entries.contains_key(key) {
            while order.len() >= self.capacity {
                if let Some(victim) = order.pop_front() {
                    self.entries.remove(&victim);
                    debug!(key = %victim, "Evicted cached response");
                } else {
                    break;
                }
            }
            order.push_back(key.to_string());
        }
        self.entries.insert(key.to_string(), entry);
    }

    /// Number of live (unexpired-or-not-yet-collected) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ResponseCacheStats {
        ResponseCacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cache = ResponseCache::new(8);
        cache.set("/a?x=1", Bytes::from_static(b"hello"), Duration::from_secs(60));

        assert_eq!(cache.get("/a?x=1").unwrap(), Bytes::from_static(b"hello"));
        assert!(cache.get("/a?x=2").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_zero_ttl_is_noop() {
        let cache = ResponseCache::new(8);
        cache.set("/a?", Bytes::from_static(b"x"), Duration::ZERO);

        assert!(cache.get("/a?").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expiry() {
        let cache = ResponseCache::new(8);
        cache.set("/a?", Bytes::from_static(b"x"), Duration::from_millis(20));

        assert!(cache.get("/a?").is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("/a?").is_none());
        // The expired entry was collected on lookup
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replace_updates_value() {
        let cache = ResponseCache::new(8);
        cache.set("/a?", Bytes::from_static(b"old"), Duration::from_secs(60));
        cache.set("/a?", Bytes::from_static(b"new"), Duration::from_secs(60));

        assert_eq!(cache.get("/a?").unwrap(), Bytes::from_static(b"new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let cache = ResponseCache::new(2);
        cache.set("/a?", Bytes::from_static(b"1"), Duration::from_secs(60));
        cache.set("/b?", Bytes::from_static(b"2"), Duration::from_secs(60));
        cache.set("/c?", Bytes::from_static(b"3"), Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        // First-inserted entry is the one that went
        assert!(cache.get("/a?").is_none());
        assert!(cache.get("/b?").is_some());
        assert!(cache.get("/c?").is_some());
    }

    #[test]
    fn test_reinsert_after_expiry_survives_at_capacity() {
        let cache = ResponseCache::new(1);
        cache.set("/a?", Bytes::from_static(b"old"), Duration::from_millis(10));

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("/a?").is_none()); // lazily collected

        cache.set("/a?", Bytes::from_static(b"new"), Duration::from_secs(60));
        assert_eq!(cache.get("/a?").unwrap(), Bytes::from_static(b"new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_empty_byte_response_is_cacheable() {
        let cache = ResponseCache::new(8);
        cache.set("/empty?", Bytes::new(), Duration::from_secs(60));

        let cached = cache.get("/empty?").unwrap();
        assert!(cached.is_empty());
    }

    #[test]
    fn test_distinct_raw_queries_are_distinct_keys() {
        let cache = ResponseCache::new(8);
        cache.set(
            "/calc?op=add&a=5&b=3",
            Bytes::from_static(b"8"),
            Duration::from_secs(60),
        );

        // Same parameters, different order: independent entry
        assert!(cache.get("/calc?op=add&b=3&a=5").is_none());
        assert!(cache.get("/calc?op=add&a=5&b=3").is_some());
    }
}
