//! Adapter Metrics
//!
//! Cache-line aligned counters for the adapter's operations.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache line size for alignment (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// Adapter Metrics (Cache-Line Aligned)
// =============================================================================

/// Operation counters, aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Debug)]
pub struct AdapterMetrics {
    /// Reads that returned an envelope
    pub hits: AtomicU64,
    /// Reads that found nothing (including bypassed reads)
    pub misses: AtomicU64,
    /// Completed writes (including bypassed writes)
    pub sets: AtomicU64,
    /// Completed removes (including bypassed removes)
    pub drops: AtomicU64,
    /// Operations skipped because the store was unreachable
    pub bypassed: AtomicU64,
    /// Operations that returned an error
    pub errors: AtomicU64,
    /// Last update timestamp (Unix millis)
    pub last_update_ms: AtomicU64,
}

const _: () = assert!(std::mem::size_of::<AdapterMetrics>() <= CACHE_LINE_SIZE);

impl Default for AdapterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            drops: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_update_ms: AtomicU64::new(0),
        }
    }

    /// Record a cache hit
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a cache miss
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a write
    #[inline]
    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a remove
    #[inline]
    pub fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record an operation skipped by bypass mode
    #[inline]
    pub fn record_bypass(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Record a failed operation
    #[inline]
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self) -> AdapterStatsSnapshot {
        AdapterStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_update_ms: self.last_update_ms.load(Ordering::Acquire),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time snapshot of adapter metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub drops: u64,
    pub bypassed: u64,
    pub errors: u64,
    pub last_update_ms: u64,
}

impl AdapterStatsSnapshot {
    /// Get total reads
    pub fn total_gets(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_gets();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
