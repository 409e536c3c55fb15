//! Counter store for fixed-window rate limiting.
//!
//! # Responsibilities
//! - Map request identity keys to counting window records
//! - Apply check-and-increment atomically per key
//! - Drop records whose window has fully elapsed (sweep)
//!
//! # Design Decisions
//! - The limiter receives a store at construction; an external shared store
//!   can replace the in-memory one without touching limiter logic
//! - The in-memory store is process-local; N instances behind a load
//!   balancer admit up to N times the configured rate

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Counting window record for one request identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    /// Requests observed in the current window.
    pub count: u64,
    /// Window start, in milliseconds since the Unix epoch.
    pub window_start_ms: u64,
    /// Window length the record was opened with.
    pub window_ms: u64,
}

impl WindowRecord {
    /// Open a new window holding a single request.
    pub fn open(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            window_start_ms: now_ms,
            window_ms,
        }
    }

    /// True once `now − window_start < window` no longer holds.
    /// A stale record must be reset, never incremented.
    pub fn is_stale(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) >= window_ms
    }

    /// Milliseconds until this window closes.
    pub fn remaining_ms(&self, now_ms: u64, window_ms: u64) -> u64 {
        (self.window_start_ms + window_ms).saturating_sub(now_ms)
    }

    /// Apply one request at `now_ms`: reset a stale window, else increment.
    pub fn observe(&mut self, now_ms: u64, window_ms: u64) {
        if self.is_stale(now_ms, window_ms) {
            *self = Self::open(now_ms, window_ms);
        } else {
            self.count += 1;
        }
    }
}

/// Storage backend for window records.
pub trait CounterStore: Send + Sync {
    /// Fetch the record for `key`, if any.
    fn get(&self, key: &str) -> Option<WindowRecord>;

    /// Replace the record for `key`.
    fn set(&self, key: &str, record: WindowRecord);

    /// Delete records whose window fully elapsed (`now − start > window`).
    /// Returns the number removed.
    fn sweep(&self, now_ms: u64) -> usize;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record one request for `key` and return the updated record.
    ///
    /// The default composes `get` and `set` and is only correct when callers
    /// for the same key never run concurrently. Stores used from a
    /// multi-threaded runtime must override it with an atomic update.
    fn hit(&self, key: &str, now_ms: u64, window_ms: u64) -> WindowRecord {
        let record = match self.get(key) {
            Some(mut record) => {
                record.observe(now_ms, window_ms);
                record
            }
            None => WindowRecord::open(now_ms, window_ms),
        };
        self.set(key, record);
        record
    }
}

/// In-memory store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, WindowRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryStore {
    fn get(&self, key: &str) -> Option<WindowRecord> {
        self.records.get(key).map(|r| *r.value())
    }

    fn set(&self, key: &str, record: WindowRecord) {
        self.records.insert(key.to_string(), record);
    }

    fn sweep(&self, now_ms: u64) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| now_ms.saturating_sub(record.window_start_ms) <= record.window_ms);
        before.saturating_sub(self.records.len())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    // The entry guard holds the shard lock across check and increment.
    fn hit(&self, key: &str, now_ms: u64, window_ms: u64) -> WindowRecord {
        let entry = self
            .records
            .entry(key.to_string())
            .and_modify(|record| record.observe(now_ms, window_ms))
            .or_insert_with(|| WindowRecord::open(now_ms, window_ms));
        *entry.value()
    }
}
