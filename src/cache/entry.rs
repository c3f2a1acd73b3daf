//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A single cached value with its expiry and access metadata.
///
/// Timestamps come from `tokio::time::Instant`, which follows the paused
/// test clock inside a runtime and the system monotonic clock elsewhere.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Key this entry is stored under
    pub key: String,
    /// The stored value, opaque to the cache
    pub value: V,
    /// When the entry was created (or last replaced)
    pub created_at: Instant,
    /// How long after `created_at` the entry stays fresh
    pub ttl: Duration,
    /// Number of successful `get`s since creation
    pub access_count: u64,
    /// Last successful `get`, or creation time
    pub last_accessed_at: Instant,
    /// Store-wide sequence number assigned at creation
    pub(crate) insert_seq: u64,
    /// Store-wide sequence number of the latest touch
    pub(crate) access_seq: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a fresh entry stamped with the current time.
    pub fn new(key: String, value: V, ttl: Duration, seq: u64) -> Self {
        let now = Instant::now();

        Self {
            key,
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
            insert_seq: seq,
            access_seq: seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once strictly more than `ttl` has elapsed since
    /// creation; at exactly `ttl` it is still fresh.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Same as [`is_expired`](Self::is_expired) against a caller-supplied clock reading.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    // == Age ==
    /// Time elapsed since the entry was created.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.created_at)
    }

    // == Time To Live ==
    /// Remaining freshness, `Duration::ZERO` once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.age())
    }

    // == Touch ==
    /// Records a successful read.
    pub(crate) fn touch(&mut self, seq: u64) {
        self.access_count += 1;
        self.last_accessed_at = Instant::now();
        self.access_seq = seq;
    }
}
