//! Eviction Module
//!
//! Chooses which entry to drop when a store needs room.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::cache::CacheEntry;
use crate::error::CacheError;

// == Eviction Strategy ==
/// Policy used to pick the victim when the cache is over capacity.
///
/// * `Lru` - evicts the entry with the oldest `last_accessed_at`
/// * `Lfu` - evicts the entry with the lowest `access_count`
/// * `Fifo` - evicts the entry with the oldest `created_at`
///
/// Ties on the primary metric go to the entry with the lowest store
/// sequence number: the oldest touch for LRU, the oldest insertion for
/// LFU and FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    #[default]
    Lru,
    Lfu,
    Fifo,
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Fifo => "fifo",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionStrategy {
    type Err = CacheError;

    /// Case-insensitive parse of `lru`, `lfu` or `fifo`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "fifo" => Ok(EvictionStrategy::Fifo),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown eviction strategy '{}'",
                other
            ))),
        }
    }
}

// == Select Victim ==
/// Returns the key the given strategy would evict, or `None` when there are
/// no entries.
pub fn select_victim<'a, V: 'a>(
    strategy: EvictionStrategy,
    entries: impl IntoIterator<Item = &'a CacheEntry<V>>,
) -> Option<&'a str> {
    let entries = entries.into_iter();

    let victim = match strategy {
        EvictionStrategy::Lru => entries.min_by_key(|e| (e.last_accessed_at, e.access_seq)),
        EvictionStrategy::Lfu => entries.min_by_key(|e| (e.access_count, e.insert_seq)),
        EvictionStrategy::Fifo => entries.min_by_key(|e| (e.created_at, e.insert_seq)),
    };

    victim.map(|e| e.key.as_str())
}
