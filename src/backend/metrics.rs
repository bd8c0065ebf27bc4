//! Per-operation counters for the connection layer.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracked by [`super::Connection`].
#[derive(Debug, Default)]
pub struct OpMetrics {
    gets: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of the operation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Total reads issued.
    pub gets: u64,
    /// Reads that found a value.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Writes issued.
    pub sets: u64,
    /// Deletes issued.
    pub deletes: u64,
    /// Scan pages fetched.
    pub scans: u64,
    /// Backend errors observed.
    pub errors: u64,
}

impl OpMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_get(&self, found: bool) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.gets.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.scans.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_and_reset() {
        let metrics = OpMetrics::new();
        metrics.record_get(true);
        metrics.record_get(false);
        metrics.record_set();
        metrics.record_error();

        let snap = metrics.snapshot();
        assert_eq!(snap.gets, 2);
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.sets, 1);
        assert_eq!(snap.errors, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot().gets, 0);
    }
}
