//! Observability hooks for the tile pipeline.
//!
//! The cache and the loader report evictions and decode failures to a
//! [`CacheMetrics`] sink instead of printing. [`TracingMetrics`] is the default
//! and turns the counters into periodic `tracing` events.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::cache::TileKey;

/// Default number of evictions between two summary log lines.
pub const DEFAULT_EVICTION_LOG_INTERVAL: u64 = 100;

/// Sink for cache and loader counters.
pub trait CacheMetrics: Send + Sync {
    /// An entry of `level` was evicted; `total_evictions` counts all levels.
    fn record_eviction(&self, level: u32, total_evictions: u64);

    /// A tile failed to decode.
    fn record_load_failure(&self, key: TileKey);
}

/// Metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    fn record_eviction(&self, _level: u32, _total_evictions: u64) {}

    fn record_load_failure(&self, _key: TileKey) {}
}

/// Metrics sink that logs through `tracing`.
///
/// Evictions are summarized once every `interval` evictions; failures are
/// counted and logged individually at debug level.
#[derive(Debug)]
pub struct TracingMetrics {
    interval: u64,
    failures: AtomicU64,
}

impl TracingMetrics {
    /// Log one eviction summary every `interval` evictions (minimum 1).
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            failures: AtomicU64::new(0),
        }
    }

    /// Number of decode failures seen so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Default for TracingMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_EVICTION_LOG_INTERVAL)
    }
}

impl CacheMetrics for TracingMetrics {
    fn record_eviction(&self, level: u32, total_evictions: u64) {
        if total_evictions % self.interval == 0 {
            debug!(
                "Tile cache evicted a level {} tile (total evictions: {})",
                level, total_evictions
            );
        }
    }

    fn record_load_failure(&self, key: TileKey) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Tile ({}, {}) level {} failed to load (total failures: {})",
            key.tile_x, key.tile_y, key.level, failures
        );
    }
}
