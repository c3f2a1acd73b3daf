//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and LRU/LFU/FIFO eviction.

mod cache_config;
mod entry;
mod eviction;
mod stats;
mod store;


// Re-export public types
pub use cache_config::{CacheConfig, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
pub use entry::CacheEntry;
pub use eviction::{select_victim, EvictionStrategy};
pub use stats::CacheStats;
pub use store::{CacheConfigProvider, CacheStore, SharedCache};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
