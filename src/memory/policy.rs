//! Memory Policy Engine
//!
//! Maps memory snapshots to cache limits and broadcasts low-memory cleanup.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::cache::{CacheConfig, CacheConfigProvider, CacheStore, EvictionStrategy, SharedCache};
use crate::memory::{run_isolated, MemoryLevel, MemoryPressureMonitor, MemorySnapshot, Subscription};

// == Level Limits ==
/// Cache limits applied at one memory level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLimits {
    pub max_entries: usize,
    pub ttl_default: Duration,
}

impl LevelLimits {
    pub const fn new(max_entries: usize, ttl_default: Duration) -> Self {
        Self {
            max_entries,
            ttl_default,
        }
    }
}

// == Policy Table ==
/// Level→limits lookup, smaller at more severe levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyTable {
    pub high: LevelLimits,
    pub medium: LevelLimits,
    pub low: LevelLimits,
    pub critical: LevelLimits,
}

impl PolicyTable {
    /// Derives a table from the `Medium` row: High doubles it, Low halves
    /// it, Critical keeps a fifth. TTLs scale 2x / 1x / 0.4x / 0.2x.
    ///
    /// The High row saturates instead of overflowing.
    pub fn scaled(max_entries: usize, ttl_default: Duration) -> Self {
        Self {
            high: LevelLimits::new(
                max_entries.saturating_mul(2),
                ttl_default.checked_mul(2).unwrap_or(Duration::MAX),
            ),
            medium: LevelLimits::new(max_entries, ttl_default),
            low: LevelLimits::new((max_entries / 2).max(1), ttl_default / 5 * 2),
            critical: LevelLimits::new((max_entries / 5).max(1), ttl_default / 5),
        }
    }

    /// The same limits at every level.
    pub fn uniform(limits: LevelLimits) -> Self {
        Self {
            high: limits,
            medium: limits,
            low: limits,
            critical: limits,
        }
    }

    pub fn limits(&self, level: MemoryLevel) -> LevelLimits {
        match level {
            MemoryLevel::High => self.high,
            MemoryLevel::Medium => self.medium,
            MemoryLevel::Low => self.low,
            MemoryLevel::Critical => self.critical,
        }
    }
}

impl Default for PolicyTable {
    /// 200/10min, 100/5min, 50/2min, 20/1min.
    fn default() -> Self {
        Self::scaled(100, Duration::from_secs(300))
    }
}

/// Callback run when the host becomes short on memory.
pub type CleanupCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct CallbackRegistry {
    next_id: u64,
    callbacks: Vec<(u64, CleanupCallback)>,
}

impl CallbackRegistry {
    fn register(registry: &Arc<Mutex<Self>>, callback: CleanupCallback) -> (u64, Weak<Mutex<Self>>) {
        let mut guard = registry.lock();
        let id = guard.next_id;
        guard.next_id += 1;
        guard.callbacks.push((id, callback));
        (id, Arc::downgrade(registry))
    }

    fn snapshot(registry: &Mutex<Self>) -> Vec<CleanupCallback> {
        registry
            .lock()
            .callbacks
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }
}

// == Callback Handle ==
/// Handle returned by [`MemoryPolicyEngine::register_cleanup_callback`] and
/// [`MemoryPolicyEngine::bind_cache`].
#[must_use = "dropping a CallbackHandle leaves the callback registered forever"]
pub struct CallbackHandle {
    registrations: Vec<(u64, Weak<Mutex<CallbackRegistry>>)>,
}

impl CallbackHandle {
    pub fn unregister(self) {
        for (id, registry) in self.registrations {
            if let Some(registry) = registry.upgrade() {
                registry.lock().callbacks.retain(|(other, _)| *other != id);
            }
        }
    }
}

struct PolicyState {
    level: Option<MemoryLevel>,
    config: CacheConfig,
}

impl PolicyState {
    fn is_low_memory(&self) -> bool {
        self.level.is_some_and(MemoryLevel::is_low)
    }
}

// == Memory Policy Engine ==
/// Holds the current [`CacheConfig`] and recomputes it from each snapshot.
///
/// Entering `Low` or `Critical` from any other level runs every registered
/// cleanup callback.
pub struct MemoryPolicyEngine {
    table: PolicyTable,
    strategy: EvictionStrategy,
    state: Arc<RwLock<PolicyState>>,
    callbacks: Arc<Mutex<CallbackRegistry>>,
    /// Run on every level change, before any cleanup callback
    level_hooks: Arc<Mutex<CallbackRegistry>>,
}

impl MemoryPolicyEngine {
    // == Constructor ==
    pub fn new(strategy: EvictionStrategy) -> Self {
        Self::with_table(PolicyTable::default(), strategy)
    }

    /// Until the first snapshot arrives the `Medium` row applies.
    pub fn with_table(table: PolicyTable, strategy: EvictionStrategy) -> Self {
        let config = Self::config_for(&table, strategy, MemoryLevel::Medium);

        Self {
            table,
            strategy,
            state: Arc::new(RwLock::new(PolicyState {
                level: None,
                config,
            })),
            callbacks: Arc::new(Mutex::new(CallbackRegistry::default())),
            level_hooks: Arc::new(Mutex::new(CallbackRegistry::default())),
        }
    }

    fn config_for(table: &PolicyTable, strategy: EvictionStrategy, level: MemoryLevel) -> CacheConfig {
        let limits = table.limits(level);
        CacheConfig::new(limits.max_entries, limits.ttl_default, strategy)
    }

    // == Accessors ==
    pub fn cache_config(&self) -> CacheConfig {
        self.state.read().config
    }

    /// Last observed level, `Medium` before any snapshot.
    pub fn current_level(&self) -> MemoryLevel {
        self.state.read().level.unwrap_or(MemoryLevel::Medium)
    }

    pub fn is_low_memory(&self) -> bool {
        self.state.read().is_low_memory()
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    // == On Snapshot ==
    /// Applies a snapshot. Returns true when it triggered a cleanup broadcast.
    pub fn on_snapshot(&self, snapshot: &MemorySnapshot) -> bool {
        let level = snapshot.level;
        let config = Self::config_for(&self.table, self.strategy, level);

        let previous = {
            let mut state = self.state.write();
            state.config = config;
            state.level.replace(level)
        };

        if previous == Some(level) {
            return false;
        }

        debug!(
            "Cache limits for level {}: max_entries={}, ttl_default={:?}",
            level, config.max_entries, config.ttl_default
        );

        for hook in CallbackRegistry::snapshot(&self.level_hooks) {
            run_isolated("level hook", || hook());
        }

        if level.is_low() {
            info!("Entered {} memory, running cleanup callbacks", level);
            self.cleanup();
            true
        } else {
            false
        }
    }

    // == Cleanup Callbacks ==
    pub fn register_cleanup_callback<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        CallbackHandle {
            registrations: vec![CallbackRegistry::register(&self.callbacks, Arc::new(callback))],
        }
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.lock().callbacks.len()
    }

    /// Runs every cleanup callback now. A panicking callback is logged and
    /// the rest still run. Returns how many completed.
    pub fn cleanup(&self) -> usize {
        CallbackRegistry::snapshot(&self.callbacks)
            .iter()
            .filter(|callback| run_isolated("cleanup callback", || callback()))
            .count()
    }

    // == Wiring ==
    /// Feeds every snapshot published by `monitor` into this engine.
    pub fn attach(self: &Arc<Self>, monitor: &MemoryPressureMonitor) -> Subscription {
        let engine = Arc::downgrade(self);
        monitor.subscribe(move |snapshot| {
            if let Some(engine) = engine.upgrade() {
                engine.on_snapshot(snapshot);
            }
        })
    }

    /// Registers a cleanup callback that purges expired entries from `cache`
    /// and shrinks it to the current limits.
    ///
    /// A store with fixed limits is also kept in step with this engine: it
    /// gets the current config and low-memory flag now and again on every
    /// level change, recovery included.
    pub fn bind_cache<V>(&self, cache: &SharedCache<V>) -> CallbackHandle
    where
        V: Send + 'static,
    {
        let mut registrations = Vec::with_capacity(2);

        if !cache.lock().has_provider() {
            let sync = {
                let cache = Arc::downgrade(cache);
                let state = Arc::clone(&self.state);
                move || {
                    if let Some(cache) = cache.upgrade() {
                        sync_fixed_store(&mut cache.lock(), &state.read());
                    }
                }
            };
            sync();
            registrations.push(CallbackRegistry::register(&self.level_hooks, Arc::new(sync)));
        }

        let cache = Arc::downgrade(cache);
        let state = Arc::clone(&self.state);
        let cleanup = move || {
            let Some(cache) = cache.upgrade() else {
                return;
            };
            let mut store = cache.lock();

            if !store.has_provider() {
                sync_fixed_store(&mut store, &state.read());
            }

            let expired = store.cleanup();
            let evicted = store.check_memory_pressure();
            info!(
                "Low-memory cleanup: {} expired, {} evicted, {} remaining",
                expired,
                evicted,
                store.len()
            );
        };
        registrations.push(CallbackRegistry::register(&self.callbacks, Arc::new(cleanup)));

        CallbackHandle { registrations }
    }
}

fn sync_fixed_store<V>(store: &mut CacheStore<V>, state: &PolicyState) {
    store.apply_config(state.config);
    store.set_low_memory(state.is_low_memory());
}

impl CacheConfigProvider for MemoryPolicyEngine {
    fn cache_config(&self) -> CacheConfig {
        MemoryPolicyEngine::cache_config(self)
    }

    fn is_low_memory(&self) -> bool {
        MemoryPolicyEngine::is_low_memory(self)
    }
}
