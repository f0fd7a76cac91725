//! Cache Statistics
//!
//! Point-in-time snapshots of per-tier cache health. Hit and miss rates are
//! computed over all observed operations, so `hit_rate + miss_rate` need not
//! sum to 1 (erroring operations count toward neither).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Cache tier identifier, ordered fastest (L1) to broadest (L3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheLayer {
    /// L1 - in-process memory
    L1,
    /// L2 - distributed key-value store
    L2,
    /// L3 - edge/CDN
    L3,
}

impl std::fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheLayer::L1 => write!(f, "L1 (memory)"),
            CacheLayer::L2 => write!(f, "L2 (distributed)"),
            CacheLayer::L3 => write!(f, "L3 (edge)"),
        }
    }
}

/// Snapshot of one tier's statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Which tier this snapshot describes
    pub layer: CacheLayer,
    /// Hits / operations (0.0 - 1.0)
    pub hit_rate: f64,
    /// Misses / operations (0.0 - 1.0)
    pub miss_rate: f64,
    /// Entries evicted by capacity pressure
    pub eviction_count: u64,
    /// Bytes currently held by the tier's backend
    pub memory_usage: u64,
    /// Operations per second since tier construction
    pub operations_per_second: f64,
}

/// Raw counters reported by a [`CacheBackend`](super::backend::CacheBackend)
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendStats {
    /// Entries currently stored
    pub entry_count: u64,
    /// Bytes currently stored
    pub size_bytes: u64,
    /// Read operations served
    pub reads: u64,
    /// Write operations served
    pub writes: u64,
    /// Delete operations served
    pub deletes: u64,
}

/// Atomic per-tier metric counters
#[derive(Debug)]
pub struct TierMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
}

impl Default for TierMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TierMetrics {
    /// Create a fresh counter set
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record several evictions at once (batch eviction)
    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Take a point-in-time snapshot for the given tier
    pub fn snapshot(&self, layer: CacheLayer, memory_usage: u64) -> CacheStats {
        let hits = self.hits() as f64;
        let misses = self.misses() as f64;
        let errors = self.errors() as f64;
        let total = hits + misses + errors;

        let (hit_rate, miss_rate) = if total == 0.0 {
            (0.0, 0.0)
        } else {
            (hits / total, misses / total)
        };

        let elapsed = self.started_at.elapsed().as_secs_f64();
        let operations_per_second = if elapsed > 0.0 { total / elapsed } else { 0.0 };

        CacheStats {
            layer,
            hit_rate,
            miss_rate,
            eviction_count: self.evictions(),
            memory_usage,
            operations_per_second,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
