//! Ticker Task
//!
//! Background task that invokes a callback at a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{CacheError, Result};

/// Callback run on every tick.
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

// == Ticker ==
/// A start/stop timer driving periodic work.
pub trait Ticker: Send + Sync {
    /// Starts ticking. Returns `Ok(false)` if already running.
    fn start(&self, tick: TickFn) -> Result<bool>;

    /// Stops ticking. Returns false if it was not running.
    fn stop(&self) -> bool;

    fn is_running(&self) -> bool;
}

// == Interval Ticker ==
/// [`Ticker`] backed by a spawned tokio task that sleeps between ticks.
///
/// The first tick fires one full interval after `start`. Dropping the ticker
/// aborts the task.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Ticker for IntervalTicker {
    fn start(&self, tick: TickFn) -> Result<bool> {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(false);
        }

        let runtime = Handle::try_current()
            .map_err(|e| CacheError::Runtime(format!("cannot start ticker: {}", e)))?;
        let interval = self.interval;

        *handle = Some(runtime.spawn(async move {
            info!("Starting ticker with interval of {:?}", interval);

            loop {
                tokio::time::sleep(interval).await;
                tick();
            }
        }));

        Ok(true)
    }

    fn stop(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                debug!("Ticker stopped");
                true
            }
            None => false,
        }
    }

    fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
