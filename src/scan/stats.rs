//! Running counters for the scanning surface.
//!
//! Plain atomics; increments happen on scanning threads, snapshots are a
//! side-effect-free read.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ScanStatistics {
    files_scanned: AtomicU64,
    files_blocked: AtomicU64,
    files_allowed: AtomicU64,
    bytes_scanned: AtomicU64,
    patterns_detected: AtomicU64,
    active_mounts: AtomicI64,
}

/// Point-in-time view of the counters, plus the cache's own numbers.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub files_scanned: u64,
    pub files_blocked: u64,
    pub files_allowed: u64,
    pub bytes_scanned: u64,
    pub patterns_detected: u64,
    pub active_mounts: i64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_entries: usize,
    pub cache_bytes: u64,
}

impl ScanStatistics {
    pub fn record_scan(&self, bytes: u64, matches: u64) {
        self.files_scanned.fetch_add(1, Ordering::Relaxed);
        self.bytes_scanned.fetch_add(bytes, Ordering::Relaxed);
        self.patterns_detected.fetch_add(matches, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.files_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allowed(&self) {
        self.files_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mount_attached(&self) {
        self.active_mounts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mount_detached(&self) {
        self.active_mounts.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, cache: &super::cache::ScanCache) -> StatsSnapshot {
        let (cache_entries, cache_bytes) = cache.size();
        StatsSnapshot {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            files_blocked: self.files_blocked.load(Ordering::Relaxed),
            files_allowed: self.files_allowed.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            patterns_detected: self.patterns_detected.load(Ordering::Relaxed),
            active_mounts: self.active_mounts.load(Ordering::Relaxed),
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            cache_entries,
            cache_bytes,
        }
    }
}
