//! Configuration Module
//!
//! Handles loading and managing process configuration from environment variables.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheConfig, EvictionStrategy};
use crate::memory::PolicyTable;

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum cache entries at `Medium` memory level
    pub max_entries: usize,
    /// Default TTL in seconds at `Medium` memory level
    pub default_ttl: u64,
    /// Eviction strategy used at every level
    pub eviction: EvictionStrategy,
    /// Memory monitor poll interval in seconds
    pub poll_interval: u64,
    /// Fixed device memory hint in GiB, replacing platform introspection
    pub device_memory_gb: Option<f64>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 100)
    /// - `CACHE_DEFAULT_TTL_SECS` - Default TTL in seconds (default: 300)
    /// - `CACHE_EVICTION` - `lru`, `lfu` or `fifo` (default: lru)
    /// - `MEMORY_POLL_INTERVAL_SECS` - Memory poll frequency in seconds (default: 30)
    /// - `DEVICE_MEMORY_GB` - Fixed device memory hint (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_entries: parse_var("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            default_ttl: parse_var("CACHE_DEFAULT_TTL_SECS").unwrap_or(defaults.default_ttl),
            eviction: env::var("CACHE_EVICTION")
                .ok()
                .and_then(|v| match v.parse() {
                    Ok(strategy) => Some(strategy),
                    Err(e) => {
                        warn!("Ignoring CACHE_EVICTION: {}", e);
                        None
                    }
                })
                .unwrap_or(defaults.eviction),
            poll_interval: parse_var("MEMORY_POLL_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.poll_interval),
            device_memory_gb: parse_var("DEVICE_MEMORY_GB"),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Level table scaled from the configured `Medium` limits.
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable::scaled(self.max_entries, Duration::from_secs(self.default_ttl))
    }

    /// Limits for a store that does not follow the memory policy.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(
            self.max_entries,
            Duration::from_secs(self.default_ttl),
            self.eviction,
        )
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 100,
            default_ttl: 300,
            eviction: EvictionStrategy::Lru,
            poll_interval: 30,
            device_memory_gb: None,
        }
    }
}
