//! Memory Sampler Module

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::memory::{MemorySignalSource, MemorySnapshot, NoSignal, SystemMemorySource};

// == Memory Sampler ==
/// Turns a [`MemorySignalSource`] reading into a classified snapshot.
///
/// Sampling never fails: a source that panics is treated like a host with
/// no signal.
#[derive(Clone)]
pub struct MemorySampler {
    source: Arc<dyn MemorySignalSource>,
}

impl MemorySampler {
    pub fn new(source: Arc<dyn MemorySignalSource>) -> Self {
        Self { source }
    }

    /// Sampler for hosts without memory introspection.
    pub fn unsupported() -> Self {
        Self::new(Arc::new(NoSignal))
    }

    /// Sampler backed by the platform's physical memory counters.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemMemorySource::new()))
    }

    // == Sample ==
    pub fn sample(&self) -> MemorySnapshot {
        match panic::catch_unwind(AssertUnwindSafe(|| self.source.read())) {
            Ok(signal) => MemorySnapshot::from_signal(signal),
            Err(_) => {
                warn!("Memory signal source panicked, falling back to unknown level");
                MemorySnapshot::unknown()
            }
        }
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::unsupported()
    }
}
