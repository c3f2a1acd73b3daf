//! Memory Module
//!
//! Samples host memory, publishes pressure snapshots and turns them into
//! cache limits.

mod level;
mod monitor;
mod policy;
mod sampler;
mod source;

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

pub use level::{MemoryLevel, MemorySnapshot};
pub use monitor::{MemoryListener, MemoryPressureMonitor, Subscription, DEFAULT_POLL_INTERVAL};
pub use policy::{CallbackHandle, CleanupCallback, LevelLimits, MemoryPolicyEngine, PolicyTable};
pub use sampler::MemorySampler;
pub use source::{ManualSignal, MemorySignal, MemorySignalSource, NoSignal, SystemMemorySource};

/// Runs a subscriber callback, logging instead of propagating a panic.
/// Returns false if it panicked.
pub(crate) fn run_isolated(what: &str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("{} panicked: {}", what, reason);
            false
        }
    }
}
