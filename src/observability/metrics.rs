//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::controlflow::Branch;

/// Operational counters for branch execution
///
/// Uses Relaxed ordering; counters are independent of each other.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    then_invocations: AtomicU64,
    else_invocations: AtomicU64,
    eager_allocations: AtomicU64,
    deferred_allocations: AtomicU64,
    feed_transfers: AtomicU64,
    fetch_transfers: AtomicU64,
    cancellations: AtomicU64,
    propagated_failures: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_invocations(&self, branch: Branch) {
        match branch {
            Branch::Then => self.then_invocations.fetch_add(1, Ordering::Relaxed),
            Branch::Else => self.else_invocations.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn invocations(&self, branch: Branch) -> u64 {
        match branch {
            Branch::Then => self.then_invocations.load(Ordering::Relaxed),
            Branch::Else => self.else_invocations.load(Ordering::Relaxed),
        }
    }

    pub fn increment_eager_allocations(&self) {
        self.eager_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deferred_allocations(&self) {
        self.deferred_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_feed_transfers(&self) {
        self.feed_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetch_transfers(&self) {
        self.fetch_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cancellations(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_propagated_failures(&self) {
        self.propagated_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            then_invocations: self.then_invocations.load(Ordering::Relaxed),
            else_invocations: self.else_invocations.load(Ordering::Relaxed),
            eager_allocations: self.eager_allocations.load(Ordering::Relaxed),
            deferred_allocations: self.deferred_allocations.load(Ordering::Relaxed),
            feed_transfers: self.feed_transfers.load(Ordering::Relaxed),
            fetch_transfers: self.fetch_transfers.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            propagated_failures: self.propagated_failures.load(Ordering::Relaxed),
        }
    }

    /// Current values as a single JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub then_invocations: u64,
    pub else_invocations: u64,
    pub eager_allocations: u64,
    pub deferred_allocations: u64,
    pub feed_transfers: u64,
    pub fetch_transfers: u64,
    pub cancellations: u64,
    pub propagated_failures: u64,
}
