//! Digest-keyed verdict cache with LRU eviction and optional TTL.
//!
//! `get`, `put`, and `evict_expired` are the only mutators, so size
//! accounting and recency order stay in one place. The whole structure
//! sits behind a single mutex: cache operations are trivially cheap next
//! to a content scan, so coarse locking is the right trade.
//!
//! Blocked verdicts are never stored — policy or file identity may
//! change between attempts, and a stale Block is worse than a rescan.

use crate::config::CacheConfig;
use crate::scan::types::ScanResult;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct CacheEntry {
    result: ScanResult,
    inserted_at: Instant,
    bytes: u64,
}

struct CacheInner {
    map: HashMap<String, CacheEntry>,
    /// Recency order, least-recently-used at the front.
    order: VecDeque<String>,
    total_bytes: u64,
}

pub struct ScanCache {
    enabled: bool,
    max_bytes: u64,
    ttl: Option<Duration>,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ScanCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_bytes: config.max_bytes,
            ttl: config.ttl(),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                total_bytes: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a live verdict by digest. Expired entries are evicted at
    /// lookup time; a hit refreshes recency.
    pub fn get(&self, digest: &str) -> Option<ScanResult> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock().expect("scan cache poisoned");
        let expired = match inner.map.get(digest) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => match self.ttl {
                Some(ttl) => entry.inserted_at.elapsed() >= ttl,
                None => false,
            },
        };
        if expired {
            remove_entry(&mut inner, digest);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        // Refresh recency.
        if let Some(pos) = inner.order.iter().position(|k| k == digest) {
            inner.order.remove(pos);
        }
        inner.order.push_back(digest.to_string());
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(inner.map[digest].result.clone())
    }

    /// Store a non-blocked verdict. The content's byte size counts
    /// against the cache budget; oldest entries are evicted to fit.
    pub fn put(&self, digest: &str, result: &ScanResult) {
        if !self.enabled || result.blocked {
            return;
        }
        let bytes = result.size_bytes;
        if bytes > self.max_bytes {
            return;
        }
        let mut inner = self.inner.lock().expect("scan cache poisoned");
        remove_entry(&mut inner, digest);
        inner.map.insert(
            digest.to_string(),
            CacheEntry {
                result: result.clone(),
                inserted_at: Instant::now(),
                bytes,
            },
        );
        inner.order.push_back(digest.to_string());
        inner.total_bytes += bytes;
        while inner.total_bytes > self.max_bytes {
            let Some(oldest) = inner.order.front().cloned() else {
                break;
            };
            remove_entry(&mut inner, &oldest);
        }
    }

    /// Drop every expired entry. Called opportunistically; correctness
    /// does not depend on it since `get` also expires.
    pub fn evict_expired(&self) {
        let Some(ttl) = self.ttl else { return };
        let mut inner = self.inner.lock().expect("scan cache poisoned");
        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() >= ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            remove_entry(&mut inner, &key);
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// (entry count, total bytes) currently held.
    pub fn size(&self) -> (usize, u64) {
        let inner = self.inner.lock().expect("scan cache poisoned");
        (inner.map.len(), inner.total_bytes)
    }
}

fn remove_entry(inner: &mut CacheInner, digest: &str) {
    if let Some(entry) = inner.map.remove(digest) {
        inner.total_bytes -= entry.bytes;
        if let Some(pos) = inner.order.iter().position(|k| k == digest) {
            inner.order.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::types::ScanResult;

    fn cache(max_bytes: u64, ttl_secs: Option<u64>) -> ScanCache {
        ScanCache::new(&CacheConfig {
            enabled: true,
            max_bytes,
            ttl_secs,
        })
    }

    fn allow_result(bytes: u64) -> ScanResult {
        let mut r = ScanResult::allow("clean");
        r.size_bytes = bytes;
        r
    }

    #[test]
    fn hit_after_put() {
        let cache = cache(1024, None);
        cache.put("d1", &allow_result(10));
        let hit = cache.get("d1").expect("cached verdict");
        assert_eq!(hit.reason, "clean");
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn miss_counts() {
        let cache = cache(1024, None);
        assert!(cache.get("absent").is_none());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn blocked_verdicts_are_never_stored() {
        let cache = cache(1024, None);
        let mut blocked = ScanResult::block("sensitive");
        blocked.size_bytes = 10;
        cache.put("d1", &blocked);
        assert!(cache.get("d1").is_none());
        assert_eq!(cache.size().0, 0);
    }

    #[test]
    fn byte_budget_evicts_oldest_first() {
        let cache = cache(100, None);
        cache.put("a", &allow_result(40));
        cache.put("b", &allow_result(40));
        cache.put("c", &allow_result(40)); // exceeds 100, "a" evicted
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.size(), (2, 80));
    }

    #[test]
    fn recency_refresh_protects_hot_entries() {
        let cache = cache(100, None);
        cache.put("a", &allow_result(40));
        cache.put("b", &allow_result(40));
        cache.get("a"); // "a" is now most recent
        cache.put("c", &allow_result(40)); // "b" is the oldest, evicted
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn zero_ttl_expires_at_lookup() {
        let cache = cache(1024, Some(0));
        cache.put("d1", &allow_result(10));
        assert!(cache.get("d1").is_none());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.size().0, 0);
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = ScanCache::new(&CacheConfig {
            enabled: false,
            max_bytes: 1024,
            ttl_secs: None,
        });
        cache.put("d1", &allow_result(10));
        assert!(cache.get("d1").is_none());
        assert_eq!(cache.hits() + cache.misses(), 0);
    }

    #[test]
    fn oversized_entry_is_rejected_outright() {
        let cache = cache(100, None);
        cache.put("big", &allow_result(500));
        assert_eq!(cache.size().0, 0);
    }

    #[test]
    fn reinsert_replaces_without_double_counting() {
        let cache = cache(100, None);
        cache.put("a", &allow_result(40));
        cache.put("a", &allow_result(60));
        assert_eq!(cache.size(), (1, 60));
    }
}
