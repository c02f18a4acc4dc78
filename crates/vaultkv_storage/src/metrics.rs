//! Usage metrics emitted by the storage layers.
//!
//! Layers report counters and latency samples to an injected
//! [`MetricsSink`]. The sink is owned by the caller; vaultkv never formats
//! or exports metrics itself.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use vaultkv_storage::{CacheBackend, CacheConfig, InMemoryBackend, InmemSink};
//!
//! let sink = Arc::new(InmemSink::new());
//! let cache = CacheBackend::with_metrics(
//!     Arc::new(InMemoryBackend::new()),
//!     CacheConfig::default(),
//!     sink.clone(),
//! );
//! # let _ = cache;
//! assert_eq!(sink.counter("cache.hit"), 0);
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Destination for counters and timing samples.
///
/// Keys are given as segments (`["cache", "hit"]`) and joined with `.` by
/// sinks that need a flat name.
pub trait MetricsSink: Send + Sync {
    /// Adds `value` to the counter named by `key`.
    fn incr_counter(&self, key: &[&str], value: u64);

    /// Records one latency sample for `key`.
    fn record_latency(&self, key: &[&str], elapsed: Duration);
}

/// A sink that discards everything.
///
/// Used when no sink is supplied; behaviour of the emitting layer is
/// identical, only observability is lost.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn incr_counter(&self, _key: &[&str], _value: u64) {}

    fn record_latency(&self, _key: &[&str], _elapsed: Duration) {}
}

/// Aggregated latency samples for one key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    /// Number of samples.
    pub count: u64,
    /// Sum of all samples.
    pub total: Duration,
    /// Largest sample.
    pub max: Duration,
}

/// An in-memory sink that aggregates counters and latency summaries.
///
/// Suitable for tests and for exposing a snapshot through a caller's own
/// diagnostics endpoint.
#[derive(Debug, Default)]
pub struct InmemSink {
    counters: Mutex<HashMap<String, u64>>,
    latencies: Mutex<HashMap<String, LatencySummary>>,
}

impl InmemSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of a counter, 0 if never incremented.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Returns the latency summary for `name`, if any sample was recorded.
    #[must_use]
    pub fn latency(&self, name: &str) -> Option<LatencySummary> {
        self.latencies.lock().get(name).copied()
    }

    /// Returns a copy of all counters.
    #[must_use]
    pub fn counters(&self) -> HashMap<String, u64> {
        self.counters.lock().clone()
    }

    /// Resets all counters and summaries.
    pub fn reset(&self) {
        self.counters.lock().clear();
        self.latencies.lock().clear();
    }
}

impl MetricsSink for InmemSink {
    fn incr_counter(&self, key: &[&str], value: u64) {
        *self.counters.lock().entry(key.join(".")).or_insert(0) += value;
    }

    fn record_latency(&self, key: &[&str], elapsed: Duration) {
        let mut latencies = self.latencies.lock();
        let summary = latencies.entry(key.join(".")).or_default();
        summary.count += 1;
        summary.total += elapsed;
        summary.max = summary.max.max(elapsed);
    }
}
