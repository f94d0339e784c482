//! Simulation result cache.
//!
//! The cache is an injected collaborator: a [`CacheStore`] holds encoded
//! values with a TTL, and [`AutarkyCache`] wraps it with get-or-compute
//! semantics for [`AutarkyResult`]s. Every store error is treated as a
//! miss, so an unavailable backend only costs recomputation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::autarky::AutarkyResult;
use crate::error::CacheError;

/// Key-value store with per-entry expiry.
///
/// Contract: `get` never returns an entry after its TTL has elapsed; a TTL
/// of zero means the entry does not expire. `set` on an existing key
/// replaces it (last writer wins).
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Removes one key, returning whether it existed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every key starting with `prefix`, returning how many were removed.
    fn clear_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|t| now < t)
    }
}

/// Process-local cache backed by a locked map.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}

/// A cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheStore for NoCache {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn clear_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
        Ok(0)
    }
}

/// An autarky result plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAutarky {
    pub result: AutarkyResult,
    pub cache_hit: bool,
    pub cache_key: String,
}

/// Get-or-compute wrapper around a [`CacheStore`] for autarky results.
///
/// Computation for one key is serialised: concurrent callers with the same
/// key wait for the first one and then read its stored value, so a live
/// cache runs at most one simulation per key.
pub struct AutarkyCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AutarkyCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// A wrapper that always computes.
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoCache), Duration::ZERO)
    }

    /// Namespaced key for a community signature within a scope.
    pub fn key_for(scope: &str, signature: &str) -> String {
        format!("autarky:{scope}:{signature}")
    }

    /// Returns the cached result for `key`, computing and storing it on a miss.
    pub fn get_or_compute(
        &self,
        key: &str,
        compute: impl FnOnce() -> AutarkyResult,
    ) -> CachedAutarky {
        if let Some(result) = self.lookup(key) {
            return self.hit(key, result);
        }

        let key_lock = self
            .in_flight
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = key_lock.lock();

        // Another caller may have finished while we waited.
        let outcome = match self.lookup(key) {
            Some(result) => self.hit(key, result),
            None => {
                let result = compute();
                self.store_result(key, &result);
                CachedAutarky {
                    result,
                    cache_hit: false,
                    cache_key: key.to_string(),
                }
            }
        };

        drop(guard);
        self.in_flight.lock().remove(key);
        outcome
    }

    /// Drops every cached result of `scope`.
    pub fn invalidate_scope(&self, scope: &str) -> usize {
        match self.store.clear_prefix(&format!("autarky:{scope}:")) {
            Ok(n) => n,
            Err(e) => {
                warn!(scope, error = %e, "cache invalidation failed");
                0
            }
        }
    }

    fn hit(&self, key: &str, result: AutarkyResult) -> CachedAutarky {
        debug!(key, "autarky cache hit");
        CachedAutarky {
            result,
            cache_hit: true,
            cache_key: key.to_string(),
        }
    }

    fn lookup(&self, key: &str) -> Option<AutarkyResult> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(key, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    fn store_result(&self, key: &str, result: &AutarkyResult) {
        let written = serde_json::to_string(result)
            .map_err(CacheError::from)
            .and_then(|raw| self.store.set(key, &raw, self.ttl));
        if let Err(e) = written {
            warn!(key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    struct FailingCache;

    impl CacheStore for FailingCache {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        fn clear_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    fn sample() -> AutarkyResult {
        AutarkyResult {
            autarky_score: 0.42,
            total_consumption_kwh: 1_000.0,
            ..AutarkyResult::empty()
        }
    }

    fn live_cache() -> AutarkyCache {
        AutarkyCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60))
    }

    #[test]
    fn miss_then_hit_with_identical_result() {
        let cache = live_cache();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            sample()
        };
        let first = cache.get_or_compute("k", compute);
        let second = cache.get_or_compute("k", compute);
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.result, second.result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_store_always_computes() {
        let cache = AutarkyCache::new(Arc::new(FailingCache), Duration::from_secs(60));
        let a = cache.get_or_compute("k", sample);
        let b = cache.get_or_compute("k", sample);
        assert!(!a.cache_hit && !b.cache_hit);
        assert_eq!(a.result, sample());
        assert_eq!(cache.invalidate_scope("x"), 0);
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = AutarkyCache::disabled();
        cache.get_or_compute("k", sample);
        assert!(!cache.get_or_compute("k", sample).cache_hit);
    }

    #[test]
    fn concurrent_callers_compute_once() {
        let cache = Arc::new(live_cache());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache.get_or_compute("shared", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        sample()
                    })
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().expect("worker panicked").result, sample());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memory_cache_expires_entries() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::from_millis(10)).unwrap();
        cache.set("b", "2", Duration::ZERO).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.get("b").unwrap().as_deref(), Some("2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn delete_and_clear_prefix() {
        let cache = MemoryCache::new();
        for key in ["autarky:t1:a", "autarky:t1:b", "autarky:t2:a"] {
            cache.set(key, "{}", Duration::ZERO).unwrap();
        }
        assert!(cache.delete("autarky:t2:a").unwrap());
        assert!(!cache.delete("autarky:t2:a").unwrap());
        assert_eq!(cache.clear_prefix("autarky:t1:").unwrap(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_scope_only_touches_that_scope() {
        let store = Arc::new(MemoryCache::new());
        let cache = AutarkyCache::new(store.clone(), Duration::ZERO);
        cache.get_or_compute(&AutarkyCache::key_for("t1", "sig"), sample);
        cache.get_or_compute(&AutarkyCache::key_for("t2", "sig"), sample);
        assert_eq!(cache.invalidate_scope("t1"), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn corrupt_entry_is_recomputed() {
        let store = Arc::new(MemoryCache::new());
        store.set("k", "not json", Duration::ZERO).unwrap();
        let cache = AutarkyCache::new(store, Duration::ZERO);
        let r = cache.get_or_compute("k", sample);
        assert!(!r.cache_hit);
        assert!(cache.get_or_compute("k", sample).cache_hit);
    }
}
