//! # Session Statistics
//!
//! Process-wide session counters using the SWMR pattern: `AtomicU64` with
//! relaxed ordering on the hot path and a snapshot DTO for readers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SessionStats {
    /// Leases handed out
    total: AtomicU64,
    /// Leases currently held
    active: AtomicU64,
    /// Failed attempts (acquire, execute or commit)
    failed: AtomicU64,
    /// Attempts that were retried after a retryable failure
    retried: AtomicU64,
    /// Queries answered by the query optimizer's cache
    cache_hits: AtomicU64,
    /// Requests refused by the circuit gate
    rejected: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_acquired(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_released(&self) {
        // Saturating so a reset while leases are held cannot underflow
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |active| {
                Some(active.saturating_sub(1))
            });
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset every counter except `active`, which tracks live leases
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.retried.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of session statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatsSnapshot {
    pub total: u64,
    pub active: u64,
    pub failed: u64,
    pub retried: u64,
    pub cache_hits: u64,
    pub rejected: u64,
}

impl SessionStatsSnapshot {
    /// Percentage of requests served from cache, if any were made
    pub fn cache_hit_rate(&self) -> Option<f64> {
        let requests = self.total + self.cache_hits;
        if requests == 0 {
            None
        } else {
            Some(self.cache_hits as f64 / requests as f64 * 100.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let stats = SessionStats::new();
        stats.record_acquired();
        stats.record_acquired();
        stats.record_released();
        stats.record_failure();
        stats.record_retry();
        stats.record_cache_hit();

        let snap = stats.snapshot();
        assert_eq!(snap.total, 2);
        assert_eq!(snap.active, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.retried, 1);
        assert_eq!(snap.cache_hits, 1);
    }

    #[test]
    fn test_reset_keeps_active_leases() {
        let stats = SessionStats::new();
        stats.record_acquired();
        stats.record_failure();
        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.total, 0);
        assert_eq!(snap.failed, 0);
        assert_eq!(snap.active, 1);

        stats.record_released();
        stats.record_released();
        assert_eq!(stats.snapshot().active, 0);
    }

    #[test]
    fn test_cache_hit_rate() {
        let empty = SessionStatsSnapshot::default();
        assert_eq!(empty.cache_hit_rate(), None);

        let snap = SessionStatsSnapshot {
            total: 3,
            cache_hits: 1,
            ..Default::default()
        };
        assert_eq!(snap.cache_hit_rate(), Some(25.0));
    }
}
