//! Cache Config Module
//!
//! The sizing and expiry parameters a cache store runs with.

use std::time::Duration;

use serde::Serialize;

use crate::cache::EvictionStrategy;

/// Default TTL applied when a store is built without explicit settings.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

// == Cache Config ==
/// Immutable snapshot of the limits a cache store enforces.
///
/// Replaced wholesale whenever the memory policy recomputes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// TTL used by `set` when the caller passes none
    pub ttl_default: Duration,
    /// Upper bound on live entries after an insert
    pub max_entries: usize,
    /// Which entry goes first when room is needed
    pub eviction_strategy: EvictionStrategy,
}

impl CacheConfig {
    pub fn new(max_entries: usize, ttl_default: Duration, eviction_strategy: EvictionStrategy) -> Self {
        Self {
            ttl_default,
            max_entries,
            eviction_strategy,
        }
    }

    /// Capacity actually enforced. A zero bound would leave no room for the
    /// entry being inserted, so it is treated as one.
    pub fn capacity(&self) -> usize {
        self.max_entries.max(1)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL, EvictionStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 100);
        assert_eq!(config.ttl_default, Duration::from_secs(300));
        assert_eq!(config.eviction_strategy, EvictionStrategy::Lru);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let config = CacheConfig::new(0, DEFAULT_TTL, EvictionStrategy::Fifo);
        assert_eq!(config.capacity(), 1);
    }
}
