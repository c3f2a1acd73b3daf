//! Cache Statistics Module
//!
//! Tracks cache usage and a point-in-time view of its contents.

use serde::Serialize;

// == Cache Stats ==
/// Cache counters plus a snapshot of the store taken by `CacheStore::stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Current number of entries, expired ones included
    pub size: usize,
    /// Configured maximum number of entries
    pub max_entries: usize,
    /// Mean `access_count` across live entries
    pub hit_rate: f64,
    /// Entries past their TTL that nothing has purged yet
    pub expired_entries: usize,
    /// Background refreshes currently in flight
    pub pending_refreshes: usize,
    /// Number of successful `get`s
    pub hits: u64,
    /// Number of `get`s that found nothing or an expired entry
    pub misses: u64,
    /// Number of entries dropped by the eviction strategy
    pub evictions: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Lookup Hit Ratio ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn lookup_hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Eviction ==
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }
}
