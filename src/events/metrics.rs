//! Atomic counters for event bus health.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters. Individual reads are atomic; use [`EventBusMetrics::snapshot`]
/// for a consistent view across all of them.
#[derive(Debug, Default)]
pub struct EventBusMetrics {
    events_published: AtomicU64,
    events_failed: AtomicU64,
}

/// Point-in-time copy of the bus counters.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub events_published: u64,
    pub events_failed: u64,
    pub active_subscribers: usize,
}

impl EventBusMetrics {
    pub(super) fn record_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_failed(&self) -> u64 {
        self.events_failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot_with_subscribers(&self, active_subscribers: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.get_published(),
            events_failed: self.get_failed(),
            active_subscribers,
        }
    }
}
