//! Memory Pressure Monitor
//!
//! Polls a [`MemorySampler`] on a [`Ticker`] and publishes each snapshot to
//! subscribers.

use std::cell::Cell;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, info};

use crate::error::Result;
use crate::memory::{run_isolated, MemorySampler, MemorySnapshot};
use crate::tasks::{IntervalTicker, Ticker};

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Callback receiving every published snapshot.
pub type MemoryListener = Arc<dyn Fn(&MemorySnapshot) + Send + Sync>;

/// A listener plus the generation of the last snapshot it was handed.
struct RegisteredListener {
    callback: MemoryListener,
    delivered: ReentrantMutex<Cell<u64>>,
}

impl RegisteredListener {
    /// Calls the listener unless it already saw this or a newer snapshot.
    /// Deliveries to one listener are serialized.
    fn deliver(&self, published: &Published) {
        let delivered = self.delivered.lock();
        if published.generation <= delivered.get() {
            return;
        }
        delivered.set(published.generation);
        run_isolated("memory listener", || (self.callback)(&published.snapshot));
    }
}

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, Arc<RegisteredListener>)>,
}

/// A snapshot stamped with its publication order, starting at 1.
#[derive(Clone)]
struct Published {
    generation: u64,
    snapshot: MemorySnapshot,
}

// == Subscription ==
/// Handle returned by [`MemoryPressureMonitor::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
#[must_use = "dropping a Subscription leaves the listener registered forever"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

// == Memory Pressure Monitor ==
pub struct MemoryPressureMonitor {
    sampler: MemorySampler,
    ticker: Box<dyn Ticker>,
    current: RwLock<Option<Published>>,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl MemoryPressureMonitor {
    // == Constructor ==
    /// Creates a monitor polling every `interval` on a tokio task.
    pub fn new(sampler: MemorySampler, interval: Duration) -> Arc<Self> {
        Self::with_ticker(sampler, Box::new(IntervalTicker::new(interval)))
    }

    pub fn with_ticker(sampler: MemorySampler, ticker: Box<dyn Ticker>) -> Arc<Self> {
        Arc::new(Self {
            sampler,
            ticker,
            current: RwLock::new(None),
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        })
    }

    // == Start ==
    /// Starts polling. Calling it while already running does nothing.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let monitor = Arc::downgrade(self);
        let started = self.ticker.start(Arc::new(move || {
            if let Some(monitor) = monitor.upgrade() {
                monitor.poll_now();
            }
        }))?;

        if started {
            info!("Memory pressure monitor started");
        }
        Ok(())
    }

    // == Stop ==
    /// Stops polling. Calling it while stopped does nothing.
    pub fn stop(&self) {
        if self.ticker.stop() {
            info!("Memory pressure monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    // == Subscribe ==
    /// Registers `listener` and immediately calls it with the current
    /// snapshot. It is then called after every poll, in subscription order.
    ///
    /// A listener never receives a snapshot older than one it already saw,
    /// even when a poll races with the subscription.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&MemorySnapshot) + Send + Sync + 'static,
    {
        let listener = Arc::new(RegisteredListener {
            callback: Arc::new(listener),
            delivered: ReentrantMutex::new(Cell::new(0)),
        });

        let id = {
            let mut registry = self.listeners.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, listener.clone()));
            id
        };

        listener.deliver(&self.published());

        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().listeners.len()
    }

    // == Current ==
    /// Latest published snapshot, sampling now if nothing was polled yet.
    pub fn current(&self) -> MemorySnapshot {
        self.published().snapshot
    }

    fn published(&self) -> Published {
        if let Some(published) = self.current.read().as_ref() {
            return published.clone();
        }

        let snapshot = self.sampler.sample();
        self.current
            .write()
            .get_or_insert(Published {
                generation: 1,
                snapshot,
            })
            .clone()
    }

    // == Poll ==
    /// Samples once and notifies every listener.
    ///
    /// Listeners run after all locks are released; one that panics is
    /// logged and skipped.
    pub fn poll_now(&self) -> MemorySnapshot {
        let snapshot = self.sampler.sample();

        let (published, previous) = {
            let mut current = self.current.write();
            let generation = current.as_ref().map_or(1, |p| p.generation + 1);
            let published = Published {
                generation,
                snapshot,
            };
            (published.clone(), current.replace(published))
        };

        let snapshot = &published.snapshot;
        match previous {
            Some(previous) if previous.snapshot.level != snapshot.level => info!(
                "Memory level changed: {} -> {} (low memory: {})",
                previous.snapshot.level, snapshot.level, snapshot.is_low_memory
            ),
            _ => debug!("Memory poll: level {}", snapshot.level),
        }

        let listeners: Vec<Arc<RegisteredListener>> = self
            .listeners
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener.deliver(&published);
        }

        published.snapshot
    }
}
