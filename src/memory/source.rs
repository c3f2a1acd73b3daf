//! Memory Signal Sources
//!
//! Adapters over whatever memory information the host exposes.

use parking_lot::{Mutex, RwLock};
use sysinfo::System;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

// == Memory Signal ==
/// Raw memory readings. Every field is optional; an all-`None` signal
/// means the host exposes nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemorySignal {
    pub device_memory_gb: Option<f64>,
    pub used_heap: Option<u64>,
    pub total_heap: Option<u64>,
    pub heap_limit: Option<u64>,
}

impl MemorySignal {
    /// A signal carrying only a device memory hint.
    pub fn device_memory_gb(gb: f64) -> Self {
        Self {
            device_memory_gb: Some(gb),
            ..Self::default()
        }
    }

    /// A signal carrying heap counters against a hard limit.
    pub fn heap(used: u64, limit: u64) -> Self {
        Self {
            used_heap: Some(used),
            total_heap: Some(limit),
            heap_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.device_memory_gb.is_none()
            && self.used_heap.is_none()
            && self.total_heap.is_none()
            && self.heap_limit.is_none()
    }

    /// `used_heap / heap_limit`, falling back to `total_heap` when there is
    /// no limit. `None` if either side is missing or zero.
    pub fn heap_ratio(&self) -> Option<f64> {
        let used = self.used_heap?;
        let limit = self.heap_limit.or(self.total_heap).filter(|l| *l > 0)?;
        Some(used as f64 / limit as f64)
    }
}

// == Memory Signal Source ==
/// Something that can read the host's memory signal.
///
/// Implementations should not fail; absence of a signal is reported as an
/// empty [`MemorySignal`].
pub trait MemorySignalSource: Send + Sync {
    fn read(&self) -> MemorySignal;
}

// == No Signal ==
/// Source for environments without memory introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignal;

impl MemorySignalSource for NoSignal {
    fn read(&self) -> MemorySignal {
        MemorySignal::default()
    }
}

// == Manual Signal ==
/// A signal set by the owner, e.g. from configuration.
#[derive(Debug, Default)]
pub struct ManualSignal {
    signal: RwLock<MemorySignal>,
}

impl ManualSignal {
    pub fn new(signal: MemorySignal) -> Self {
        Self {
            signal: RwLock::new(signal),
        }
    }

    pub fn device_memory_gb(gb: f64) -> Self {
        Self::new(MemorySignal::device_memory_gb(gb))
    }

    /// Replaces the reading returned from now on.
    pub fn set(&self, signal: MemorySignal) {
        *self.signal.write() = signal;
    }
}

impl MemorySignalSource for ManualSignal {
    fn read(&self) -> MemorySignal {
        *self.signal.read()
    }
}

// == System Memory Source ==
/// Platform adapter reading physical memory through `sysinfo`.
///
/// Total RAM becomes the device hint, and used/total RAM the heap counters.
pub struct SystemMemorySource {
    system: Mutex<System>,
}

impl SystemMemorySource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySignalSource for SystemMemorySource {
    fn read(&self) -> MemorySignal {
        let mut system = self.system.lock();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            // Platform not supported by sysinfo
            return MemorySignal::default();
        }

        let used = system.used_memory().min(total);

        MemorySignal {
            device_memory_gb: Some(total as f64 / GIB),
            used_heap: Some(used),
            total_heap: Some(total),
            heap_limit: Some(total),
        }
    }
}
