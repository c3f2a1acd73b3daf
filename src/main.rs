//! Adaptive Cache - memory-aware in-process cache
//!
//! Runs the memory monitor, policy engine and cache together and reports
//! cache statistics until interrupted.

use std::sync::Arc;
use std::time::Duration;

use adaptive_cache::memory::{ManualSignal, MemorySampler, SystemMemorySource};
use adaptive_cache::{Config, MemoryPolicyEngine, MemoryPressureMonitor, RefreshCoordinator};
use adaptive_cache::{CacheStore, SharedCache};
use serde_json::Value;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SNAPSHOT_KEY: &str = "memory:snapshot";

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the memory monitor and policy engine
/// 4. Create a cache store that follows the engine's limits
/// 5. Start polling and the stats reporter
/// 6. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Adaptive Cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, default_ttl={}s, eviction={}, poll_interval={}s",
        config.max_entries, config.default_ttl, config.eviction, config.poll_interval
    );

    let sampler = match config.device_memory_gb {
        Some(gb) => {
            info!("Using fixed device memory hint of {} GiB", gb);
            MemorySampler::new(Arc::new(ManualSignal::device_memory_gb(gb)))
        }
        None => MemorySampler::new(Arc::new(SystemMemorySource::new())),
    };
    let monitor = MemoryPressureMonitor::new(sampler, config.poll_interval());

    let engine = Arc::new(MemoryPolicyEngine::with_table(
        config.policy_table(),
        config.eviction,
    ));
    let _engine_subscription = engine.attach(&monitor);
    info!("Memory level: {}", engine.current_level());

    let cache: SharedCache<Value> = CacheStore::with_provider(engine.clone()).into_shared();
    let _cleanup_handle = engine.bind_cache(&cache);
    let coordinator = RefreshCoordinator::new(cache.clone());
    info!("Cache store initialized");

    monitor.start()?;

    let reporter = spawn_stats_reporter(coordinator, monitor.clone(), config.poll_interval());
    info!("Stats reporter started");

    shutdown_signal().await;

    reporter.abort();
    monitor.stop();
    let cleared = cache.lock().clear(None);
    info!("Shutdown complete, {} entries dropped", cleared);

    Ok(())
}

/// Keeps the latest memory snapshot cached through the refresh coordinator
/// and logs cache statistics every `interval`.
fn spawn_stats_reporter(
    coordinator: RefreshCoordinator<Value>,
    monitor: Arc<MemoryPressureMonitor>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let source = monitor.clone();
            coordinator.refresh_in_background(SNAPSHOT_KEY, move || async move {
                Ok::<_, anyhow::Error>(serde_json::to_value(source.current())?)
            });

            let stats = coordinator.cache().lock().stats();
            match serde_json::to_string(&stats) {
                Ok(json) => info!("Cache stats: {}", json),
                Err(e) => warn!("Failed to serialize cache stats: {}", e),
            }

            tokio::time::sleep(interval).await;
        }
    })
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
