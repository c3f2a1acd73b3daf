//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with pluggable eviction and
//! lazy TTL expiration.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{select_victim, CacheConfig, CacheEntry, CacheStats, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

/// A store behind the single coarse lock that guards its whole key-space.
pub type SharedCache<V> = Arc<Mutex<CacheStore<V>>>;

// == Config Provider ==
/// Live source of cache limits, consulted by a store on every operation.
pub trait CacheConfigProvider: Send + Sync {
    /// Current limits.
    fn cache_config(&self) -> CacheConfig;

    /// Whether the host is currently short on memory.
    fn is_low_memory(&self) -> bool;
}

// == Cache Store ==
/// Key-value storage with TTL expiry and LRU/LFU/FIFO eviction.
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Keys with a background refresh in flight
    in_flight: HashSet<String>,
    /// Usage counters
    stats: CacheStats,
    /// Limits used when no provider is attached
    config: CacheConfig,
    /// Low-memory flag used when no provider is attached
    low_memory: bool,
    /// Live limits, takes precedence over `config`/`low_memory`
    provider: Option<Arc<dyn CacheConfigProvider>>,
    /// Monotonic counter for eviction tie-breaks
    next_seq: u64,
}

impl<V> CacheStore<V> {
    // == Constructor ==
    /// Creates a store with fixed limits.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashSet::new(),
            stats: CacheStats::new(),
            config,
            low_memory: false,
            provider: None,
            next_seq: 0,
        }
    }

    /// Creates a store whose limits follow `provider`.
    pub fn with_provider(provider: Arc<dyn CacheConfigProvider>) -> Self {
        let mut store = Self::new(provider.cache_config());
        store.provider = Some(provider);
        store
    }

    /// Wraps the store in the shared, lock-guarded handle.
    pub fn into_shared(self) -> SharedCache<V> {
        Arc::new(Mutex::new(self))
    }

    // == Config ==
    /// Limits in force right now.
    pub fn config(&self) -> CacheConfig {
        match &self.provider {
            Some(provider) => provider.cache_config(),
            None => self.config,
        }
    }

    /// Whether the store believes the host is short on memory.
    pub fn is_low_memory(&self) -> bool {
        match &self.provider {
            Some(provider) => provider.is_low_memory(),
            None => self.low_memory,
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Replaces the fixed limits. Ignored for reads while a provider is attached.
    pub fn apply_config(&mut self, config: CacheConfig) {
        self.config = config;
    }

    /// Sets the fixed low-memory flag. Ignored while a provider is attached.
    pub fn set_low_memory(&mut self, low_memory: bool) {
        self.low_memory = low_memory;
    }

    // == Set ==
    /// Stores a value, replacing any existing entry for the key.
    ///
    /// `ttl` defaults to the configured `ttl_default`. Inserting a new key
    /// into a full store evicts first, so the size never exceeds
    /// `max_entries` afterwards.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> Result<()> {
        let key = key.into();

        if key.is_empty() {
            return Err(CacheError::InvalidKey("key must not be empty".to_string()));
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidKey(format!(
                "key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let config = self.config();

        // Overwrites reuse the slot, only new keys need room
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= config.capacity() {
                if self.evict_one(&config).is_none() {
                    break;
                }
            }
        }

        let ttl = ttl.unwrap_or(config.ttl_default);
        let seq = self.next_seq();
        self.entries
            .insert(key.clone(), CacheEntry::new(key, value, ttl, seq));

        Ok(())
    }

    // == Has ==
    /// Returns true if a fresh entry exists. An expired entry is removed.
    pub fn has(&mut self, key: &str) -> bool {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return false,
        };

        if expired {
            self.entries.remove(key);
        }
        !expired
    }

    // == Peek Entry ==
    /// Returns the entry for `key`, expired or not, with no side effects.
    pub fn peek_entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    // == Clear ==
    /// Removes one entry, or every entry when `key` is `None`.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&mut self, key: Option<&str>) -> usize {
        match key {
            Some(key) => usize::from(self.entries.remove(key).is_some()),
            None => {
                let count = self.entries.len();
                self.entries.clear();
                count
            }
        }
    }

    // == Cleanup ==
    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();

        self.entries.retain(|_, entry| !entry.is_expired_at(now));

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Cache cleanup: removed {} expired entries", removed);
        }
        removed
    }

    // == Check Memory Pressure ==
    /// Evicts until the store fits its bound.
    ///
    /// The bound is `max_entries`, or half of it while the host is low on
    /// memory. Returns the number of entries evicted.
    pub fn check_memory_pressure(&mut self) -> usize {
        let config = self.config();
        let target = if self.is_low_memory() {
            config.max_entries / 2
        } else {
            config.max_entries
        };

        let mut evicted = 0;
        while self.entries.len() > target {
            if self.evict_one(&config).is_none() {
                break;
            }
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                "Memory pressure: evicted {} entries down to target {} ({})",
                evicted, target, config.eviction_strategy
            );
        }
        evicted
    }

    // == Stats ==
    /// Returns the counters together with a snapshot of the current contents.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut stats = self.stats.clone();

        let (live_count, live_accesses, expired) =
            self.entries
                .values()
                .fold((0usize, 0u64, 0usize), |(live, accesses, expired), entry| {
                    if entry.is_expired_at(now) {
                        (live, accesses, expired + 1)
                    } else {
                        (live + 1, accesses + entry.access_count, expired)
                    }
                });

        stats.size = self.entries.len();
        stats.max_entries = self.config().max_entries;
        stats.hit_rate = if live_count == 0 {
            0.0
        } else {
            live_accesses as f64 / live_count as f64
        };
        stats.expired_entries = expired;
        stats.pending_refreshes = self.in_flight.len();
        stats
    }

    // == Refresh Tracking ==
    /// Marks `key` as being refreshed. Returns false if it already was.
    pub fn begin_refresh(&mut self, key: &str) -> bool {
        self.in_flight.insert(key.to_string())
    }

    /// Clears the in-flight mark for `key`.
    pub fn finish_refresh(&mut self, key: &str) {
        self.in_flight.remove(key);
    }

    pub fn is_refreshing(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    // == Evict One ==
    fn evict_one(&mut self, config: &CacheConfig) -> Option<String> {
        let victim = select_victim(config.eviction_strategy, self.entries.values())?.to_string();
        self.entries.remove(&victim);
        self.stats.record_eviction();
        Some(victim)
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

impl<V: Clone> CacheStore<V> {
    // == Get ==
    /// Retrieves a fresh value and records the access.
    ///
    /// Expired entries are removed and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.stats.record_miss();
            return None;
        }

        let seq = self.next_seq();
        let entry = self.entries.get_mut(key)?;
        entry.touch(seq);
        self.stats.record_hit();
        Some(entry.value.clone())
    }

    // == Peek ==
    /// Returns the stored value even if expired, without bookkeeping or removal.
    pub fn peek(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }
}

impl<V> fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("len", &self.entries.len())
            .field("in_flight", &self.in_flight.len())
            .field("config", &self.config())
            .field("low_memory", &self.is_low_memory())
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionStrategy;

    fn store(max_entries: usize, strategy: EvictionStrategy) -> CacheStore<String> {
        CacheStore::new(CacheConfig::new(max_entries, Duration::from_secs(300), strategy))
    }

    fn set(store: &mut CacheStore<String>, key: &str, value: &str) {
        store.set(key, value.to_string(), None).unwrap();
    }

    struct FixedProvider {
        config: CacheConfig,
        low_memory: bool,
    }

    impl CacheConfigProvider for FixedProvider {
        fn cache_config(&self) -> CacheConfig {
            self.config
        }

        fn is_low_memory(&self) -> bool {
            self.low_memory
        }
    }

    #[test]
    fn test_store_new() {
        let store = store(100, EvictionStrategy::Lru);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert!(!store.has_provider());
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store(100, EvictionStrategy::Lru);

        set(&mut store, "key1", "value1");

        assert_eq!(store.get("key1"), Some("value1".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store(100, EvictionStrategy::Lru);
        assert_eq!(store.get("nonexistent"), None);
    }

    #[test]
    fn test_store_rejects_bad_keys() {
        let mut store = store(100, EvictionStrategy::Lru);
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);

        assert!(matches!(
            store.set(long_key, "v".to_string(), None),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            store.set("", "v".to_string(), None),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_overwrite_resets_entry() {
        let mut store = store(100, EvictionStrategy::Lru);

        set(&mut store, "key1", "value1");
        store.get("key1");
        set(&mut store, "key1", "value2");

        assert_eq!(store.peek_entry("key1").unwrap().access_count, 0);
        assert_eq!(store.get("key1"), Some("value2".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_overwrite_at_capacity_does_not_evict() {
        let mut store = store(2, EvictionStrategy::Lru);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");
        set(&mut store, "a", "3");

        assert_eq!(store.len(), 2);
        assert!(store.has("b"));
        assert_eq!(store.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ttl_expiration() {
        let mut store = store(100, EvictionStrategy::Lru);

        store
            .set("k", "v".to_string(), Some(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(store.get("k"), Some("v".to_string()));

        tokio::time::advance(Duration::from_millis(150)).await;

        assert_eq!(store.get("k"), None);
        assert!(store.is_empty(), "expired entry is removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_has_is_lazy_and_side_effect_free() {
        let mut store = store(100, EvictionStrategy::Lru);

        store
            .set("k", "v".to_string(), Some(Duration::from_millis(100)))
            .unwrap();
        assert!(store.has("k"));
        assert_eq!(store.peek_entry("k").unwrap().access_count, 0);

        tokio::time::advance(Duration::from_millis(101)).await;

        assert!(!store.has("k"));
        assert!(store.peek_entry("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_default_ttl_from_config() {
        let mut store: CacheStore<u32> = CacheStore::new(CacheConfig::new(
            10,
            Duration::from_secs(1),
            EvictionStrategy::Lru,
        ));

        store.set("k", 1, None).unwrap();
        assert_eq!(store.peek_entry("k").unwrap().ttl, Duration::from_secs(1));

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(store.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_peek_keeps_expired_entry() {
        let mut store = store(100, EvictionStrategy::Lru);

        store
            .set("k", "stale".to_string(), Some(Duration::from_millis(10)))
            .unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;

        assert_eq!(store.peek("k"), Some("stale".to_string()));
        assert_eq!(store.peek("k"), Some("stale".to_string()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().hits, 0);
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(2, EvictionStrategy::Lru);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");
        store.get("a");
        set(&mut store, "c", "3");

        let mut keys: Vec<&str> = store.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_store_lfu_eviction() {
        let mut store = store(3, EvictionStrategy::Lfu);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");
        set(&mut store, "c", "3");
        store.get("a");
        store.get("a");
        store.get("c");

        set(&mut store, "d", "4");

        assert!(store.has("a"));
        assert!(!store.has("b"));
        assert!(store.has("c"));
        assert!(store.has("d"));
    }

    #[test]
    fn test_store_fifo_eviction_ignores_reads() {
        let mut store = store(2, EvictionStrategy::Fifo);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");
        store.get("a");
        set(&mut store, "c", "3");

        assert!(!store.has("a"));
        assert!(store.has("b"));
        assert!(store.has("c"));
    }

    #[test]
    fn test_store_clear_one_and_all() {
        let mut store = store(10, EvictionStrategy::Lru);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");
        set(&mut store, "c", "3");

        assert_eq!(store.clear(Some("a")), 1);
        assert_eq!(store.clear(Some("a")), 0);
        assert_eq!(store.len(), 2);

        assert_eq!(store.clear(None), 2);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_cleanup_expired() {
        let mut store = store(100, EvictionStrategy::Lru);

        store
            .set("short", "1".to_string(), Some(Duration::from_millis(100)))
            .unwrap();
        store
            .set("long", "2".to_string(), Some(Duration::from_secs(10)))
            .unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;

        assert_eq!(store.stats().expired_entries, 1);
        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.has("long"));
        assert_eq!(store.stats().expired_entries, 0);
    }

    #[test]
    fn test_check_memory_pressure_corrects_overflow() {
        let mut store = store(10, EvictionStrategy::Fifo);
        for i in 0..10 {
            set(&mut store, &format!("k{}", i), "v");
        }

        store.apply_config(CacheConfig::new(4, Duration::from_secs(300), EvictionStrategy::Fifo));

        assert_eq!(store.check_memory_pressure(), 6);
        assert_eq!(store.len(), 4);
        // FIFO keeps the newest entries
        assert!(store.has("k9"));
        assert!(!store.has("k0"));
    }

    #[test]
    fn test_check_memory_pressure_halves_on_low_memory() {
        let mut store = store(20, EvictionStrategy::Lru);
        for i in 0..20 {
            set(&mut store, &format!("k{}", i), "v");
        }

        assert_eq!(store.check_memory_pressure(), 0);

        store.set_low_memory(true);
        store.cleanup();
        store.check_memory_pressure();

        assert!(store.len() <= 10);
    }

    #[test]
    fn test_check_memory_pressure_on_empty_store() {
        let mut store = store(0, EvictionStrategy::Lru);
        store.set_low_memory(true);
        assert_eq!(store.check_memory_pressure(), 0);
    }

    #[test]
    fn test_store_follows_provider() {
        let provider = Arc::new(FixedProvider {
            config: CacheConfig::new(3, Duration::from_secs(60), EvictionStrategy::Fifo),
            low_memory: true,
        });
        let mut store: CacheStore<u32> = CacheStore::with_provider(provider);

        assert!(store.has_provider());
        assert!(store.is_low_memory());

        // Fixed settings are shadowed by the provider
        store.set_low_memory(false);
        store.apply_config(CacheConfig::default());
        assert!(store.is_low_memory());
        assert_eq!(store.config().max_entries, 3);

        for i in 0..5 {
            store.set(format!("k{}", i), i, None).unwrap();
        }
        assert_eq!(store.len(), 3);

        store.check_memory_pressure();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_stats() {
        let mut store = store(100, EvictionStrategy::Lru);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");
        store.get("a");
        store.get("a");
        store.get("missing");

        let stats = store.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_entries, 100);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 1.0);
        assert_eq!(stats.expired_entries, 0);
        assert_eq!(stats.pending_refreshes, 0);
    }

    #[test]
    fn test_refresh_tracking() {
        let mut store = store(10, EvictionStrategy::Lru);

        assert!(store.begin_refresh("k"));
        assert!(!store.begin_refresh("k"));
        assert!(store.is_refreshing("k"));
        assert_eq!(store.stats().pending_refreshes, 1);

        store.finish_refresh("k");
        assert!(!store.is_refreshing("k"));
        assert_eq!(store.stats().pending_refreshes, 0);
    }
}
