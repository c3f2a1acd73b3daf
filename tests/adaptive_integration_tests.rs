//! Integration tests wiring the memory monitor, policy engine, cache store
//! and refresh coordinator together through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adaptive_cache::memory::{LevelLimits, ManualSignal, MemorySignal, PolicyTable};
use adaptive_cache::{
    CacheStore, EvictionStrategy, MemoryLevel, MemoryPolicyEngine, MemoryPressureMonitor,
    MemorySampler, RefreshCoordinator, SharedCache,
};

struct Harness {
    signal: Arc<ManualSignal>,
    monitor: Arc<MemoryPressureMonitor>,
    engine: Arc<MemoryPolicyEngine>,
    cache: SharedCache<String>,
    _handles: (adaptive_cache::memory::Subscription, adaptive_cache::memory::CallbackHandle),
}

/// Host starts with plenty of memory (8 GiB device hint).
fn harness(table: PolicyTable, strategy: EvictionStrategy) -> Harness {
    let signal = Arc::new(ManualSignal::device_memory_gb(8.0));
    let sampler = MemorySampler::new(signal.clone());
    let monitor = MemoryPressureMonitor::new(sampler, Duration::from_secs(1));

    let engine = Arc::new(MemoryPolicyEngine::with_table(table, strategy));
    let subscription = engine.attach(&monitor);

    let cache = CacheStore::with_provider(engine.clone()).into_shared();
    let callback = engine.bind_cache(&cache);

    Harness {
        signal,
        monitor,
        engine,
        cache,
        _handles: (subscription, callback),
    }
}

fn fill(cache: &SharedCache<String>, count: usize) {
    let mut store = cache.lock();
    for i in 0..count {
        store
            .set(format!("key{}", i), format!("value{}", i), None)
            .unwrap();
    }
}

#[tokio::test]
async fn test_low_memory_shrinks_bound_cache() {
    let h = harness(
        PolicyTable::uniform(LevelLimits::new(20, Duration::from_secs(60))),
        EvictionStrategy::Lru,
    );
    assert_eq!(h.engine.current_level(), MemoryLevel::High);

    fill(&h.cache, 20);
    assert_eq!(h.cache.lock().len(), 20);

    h.signal.set(MemorySignal::device_memory_gb(1.5));
    let snapshot = h.monitor.poll_now();

    assert_eq!(snapshot.level, MemoryLevel::Low);
    assert!(h.engine.is_low_memory());

    let store = h.cache.lock();
    assert!(store.len() <= 10);
    assert!(store.is_low_memory());
    // The oldest keys were never read, so they went first
    assert!(!store.keys().any(|k| k == "key0"));
    assert!(store.keys().any(|k| k == "key19"));
}

#[tokio::test]
async fn test_store_follows_level_limits() {
    let h = harness(PolicyTable::default(), EvictionStrategy::Fifo);

    let config = h.cache.lock().config();
    assert_eq!(config.max_entries, 200);
    assert_eq!(config.ttl_default, Duration::from_secs(600));
    assert_eq!(config.eviction_strategy, EvictionStrategy::Fifo);

    h.signal.set(MemorySignal::device_memory_gb(0.5));
    h.monitor.poll_now();

    let config = h.cache.lock().config();
    assert_eq!(config.max_entries, 20);
    assert_eq!(config.ttl_default, Duration::from_secs(60));

    h.signal.set(MemorySignal::device_memory_gb(3.0));
    h.monitor.poll_now();

    let store = h.cache.lock();
    assert_eq!(store.config().max_entries, 100);
    assert!(!store.is_low_memory());
}

#[tokio::test]
async fn test_new_entries_respect_shrunk_capacity() {
    let h = harness(PolicyTable::default(), EvictionStrategy::Lru);

    h.signal.set(MemorySignal::heap(95, 100));
    h.monitor.poll_now();
    assert_eq!(h.engine.current_level(), MemoryLevel::Critical);

    fill(&h.cache, 50);
    let stats = h.cache.lock().stats();
    assert_eq!(stats.max_entries, 20);
    assert_eq!(stats.size, 20);
    assert_eq!(stats.evictions, 30);
}

#[tokio::test(start_paused = true)]
async fn test_low_memory_cleanup_drops_expired_entries() {
    let h = harness(
        PolicyTable::uniform(LevelLimits::new(50, Duration::from_secs(60))),
        EvictionStrategy::Lfu,
    );

    {
        let mut store = h.cache.lock();
        store
            .set("short", "gone".to_string(), Some(Duration::from_millis(100)))
            .unwrap();
        store.set("long", "kept".to_string(), None).unwrap();
    }
    tokio::time::advance(Duration::from_millis(200)).await;

    h.signal.set(MemorySignal::device_memory_gb(1.0));
    h.monitor.poll_now();

    let mut store = h.cache.lock();
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("long"), Some("kept".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_running_monitor_drives_cleanup() {
    let h = harness(
        PolicyTable::uniform(LevelLimits::new(10, Duration::from_secs(60))),
        EvictionStrategy::Lru,
    );
    fill(&h.cache, 10);

    h.monitor.start().unwrap();
    assert!(h.monitor.is_running());

    h.signal.set(MemorySignal::device_memory_gb(1.5));
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(h.engine.current_level(), MemoryLevel::Low);
    assert!(h.cache.lock().len() <= 5);

    h.monitor.stop();
    assert!(!h.monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_fills_bound_cache() {
    let h = harness(PolicyTable::default(), EvictionStrategy::Lru);
    let coordinator = RefreshCoordinator::new(h.cache.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let first = coordinator.refresh_in_background("profile", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, anyhow::Error>("alice".to_string())
        }
    });
    assert_eq!(first, None);

    tokio::time::sleep(Duration::from_millis(60)).await;

    let counter = calls.clone();
    let second = coordinator.refresh_in_background("profile", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, anyhow::Error>("bob".to_string()) }
    });

    assert_eq!(second, Some("alice".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.lock().stats().pending_refreshes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_entry_served_then_replaced() {
    let h = harness(PolicyTable::default(), EvictionStrategy::Lru);
    let coordinator = RefreshCoordinator::new(h.cache.clone());

    h.cache
        .lock()
        .set("feed", "old".to_string(), Some(Duration::from_millis(100)))
        .unwrap();
    tokio::time::advance(Duration::from_millis(150)).await;

    let served = coordinator.refresh_in_background("feed", || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, anyhow::Error>("new".to_string())
    });
    assert_eq!(served, Some("old".to_string()));
    assert!(h.cache.lock().is_refreshing("feed"));

    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut store = h.cache.lock();
    assert_eq!(store.get("feed"), Some("new".to_string()));
    assert!(!store.is_refreshing("feed"));
}
