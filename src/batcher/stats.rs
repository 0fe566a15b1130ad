//! Facts-only runtime counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A point-in-time snapshot of batcher activity. Facts only, no policy;
/// applications build their own alerting or scheduling on top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatcherStats {
    /// Submissions accepted by the core loop.
    pub accepted: u64,
    /// Batches handed to the downstream sender.
    pub batches_dispatched: u64,
    /// Sub-requests across all dispatched batches.
    pub requests_dispatched: u64,
    /// Dispatched batches that failed (downstream error or a bad
    /// positional response).
    pub failed_batches: u64,
    /// Batches currently in flight at the sender.
    pub in_flight: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StatsInner {
    accepted: AtomicU64,
    batches_dispatched: AtomicU64,
    requests_dispatched: AtomicU64,
    failed_batches: AtomicU64,
    in_flight: AtomicUsize,
}

impl StatsInner {
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self, requests: usize) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.requests_dispatched
            .fetch_add(requests as u64, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_failed_batch(&self) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BatcherStats {
        BatcherStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}
