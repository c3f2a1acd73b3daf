//! Memory Level Module
//!
//! Qualitative memory headroom and the snapshot the sampler produces.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::MemorySignal;

// Heap usage ratios above which a level applies
const CRITICAL_HEAP_RATIO: f64 = 0.90;
const LOW_HEAP_RATIO: f64 = 0.75;
const MEDIUM_HEAP_RATIO: f64 = 0.50;

// Device memory (GiB) below which a level applies
const CRITICAL_DEVICE_GB: f64 = 1.0;
const LOW_DEVICE_GB: f64 = 2.0;
const MEDIUM_DEVICE_GB: f64 = 4.0;

// == Memory Level ==
/// Memory headroom, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLevel {
    High,
    Medium,
    Low,
    Critical,
}

impl MemoryLevel {
    /// True for `Low` and `Critical`.
    pub fn is_low(self) -> bool {
        matches!(self, MemoryLevel::Low | MemoryLevel::Critical)
    }

    /// Classifies a used/limit heap ratio.
    pub fn from_heap_ratio(ratio: f64) -> Self {
        if ratio > CRITICAL_HEAP_RATIO {
            MemoryLevel::Critical
        } else if ratio > LOW_HEAP_RATIO {
            MemoryLevel::Low
        } else if ratio > MEDIUM_HEAP_RATIO {
            MemoryLevel::Medium
        } else {
            MemoryLevel::High
        }
    }

    /// Classifies a reported device memory size in GiB.
    pub fn from_device_memory_gb(gb: f64) -> Self {
        if gb < CRITICAL_DEVICE_GB {
            MemoryLevel::Critical
        } else if gb < LOW_DEVICE_GB {
            MemoryLevel::Low
        } else if gb < MEDIUM_DEVICE_GB {
            MemoryLevel::Medium
        } else {
            MemoryLevel::High
        }
    }
}

impl fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryLevel::High => "high",
            MemoryLevel::Medium => "medium",
            MemoryLevel::Low => "low",
            MemoryLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

// == Memory Snapshot ==
/// One classified reading of the host memory signal.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    /// Reported device memory in GiB
    pub device_memory_gb: Option<f64>,
    /// Bytes in use
    pub used_heap: Option<u64>,
    /// Bytes currently reserved
    pub total_heap: Option<u64>,
    /// Bytes that may be reserved at most
    pub heap_limit: Option<u64>,
    pub level: MemoryLevel,
    /// `level` is `Low` or `Critical`
    pub is_low_memory: bool,
    pub sampled_at: DateTime<Utc>,
}

impl MemorySnapshot {
    /// Snapshot used when the host exposes no memory signal.
    pub fn unknown() -> Self {
        Self::from_signal(MemorySignal::default())
    }

    /// Classifies a raw signal. When both heap counters and a device hint
    /// are present the more severe reading wins; with neither the level is
    /// `Medium`.
    pub fn from_signal(signal: MemorySignal) -> Self {
        let device_memory_gb = signal
            .device_memory_gb
            .filter(|gb| gb.is_finite() && *gb > 0.0);

        let heap_level = signal.heap_ratio().map(MemoryLevel::from_heap_ratio);
        let device_level = device_memory_gb.map(MemoryLevel::from_device_memory_gb);

        let level = match (heap_level, device_level) {
            (Some(heap), Some(device)) => heap.max(device),
            (Some(level), None) | (None, Some(level)) => level,
            (None, None) => MemoryLevel::Medium,
        };

        Self {
            device_memory_gb,
            used_heap: signal.used_heap,
            total_heap: signal.total_heap,
            heap_limit: signal.heap_limit,
            level,
            is_low_memory: level.is_low(),
            sampled_at: Utc::now(),
        }
    }
}

impl Default for MemorySnapshot {
    fn default() -> Self {
        Self::unknown()
    }
}
