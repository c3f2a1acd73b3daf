//! Adaptive Cache - an in-process cache that adapts to memory pressure
//!
//! Provides a TTL cache with LRU/LFU/FIFO eviction, a memory monitor and
//! policy engine that resize it as host memory changes, and a
//! stale-while-revalidate refresh coordinator.

pub mod cache;
pub mod config;
pub mod error;
pub mod memory;
pub mod refresh;
pub mod tasks;

pub use cache::{CacheConfig, CacheStats, CacheStore, EvictionStrategy, SharedCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use memory::{
    MemoryLevel, MemoryPolicyEngine, MemoryPressureMonitor, MemorySampler, MemorySnapshot,
};
pub use refresh::{RefreshCoordinator, RefreshHooks};
