//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of delivery counters since the service was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    /// Operations accepted by the queue.
    pub enqueued: u64,
    /// Operations currently waiting in the queue.
    pub queued: u64,
    /// Operations handed to a delivery task.
    pub dispatched: u64,
    /// Operations the remote service accepted.
    pub delivered: u64,
    /// Publishes ended by a terminal rejection.
    pub rejected: u64,
    /// Operations the service answered with a well-formed error that was
    /// not retried.
    pub unaccepted: u64,
    /// Attempts that were followed by another attempt.
    pub retries: u64,
    /// Operations whose bounded policy ran out.
    pub exhausted: u64,
    /// Operations that failed without a retryable cause.
    pub failed: u64,
    /// Operations stopped by shutdown.
    pub cancelled: u64,
    /// Delivery tasks currently running.
    pub in_flight: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    pub(crate) enqueued: AtomicU64,
    pub(crate) dispatched: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) unaccepted: AtomicU64,
    pub(crate) retries: AtomicU64,
    pub(crate) exhausted: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) cancelled: AtomicU64,
    pub(crate) in_flight: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decr(counter: &AtomicU64) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, queued: usize) -> DeliveryStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        DeliveryStats {
            enqueued: load(&self.enqueued),
            queued: u64::try_from(queued).unwrap_or(u64::MAX),
            dispatched: load(&self.dispatched),
            delivered: load(&self.delivered),
            rejected: load(&self.rejected),
            unaccepted: load(&self.unaccepted),
            retries: load(&self.retries),
            exhausted: load(&self.exhausted),
            failed: load(&self.failed),
            cancelled: load(&self.cancelled),
            in_flight: load(&self.in_flight),
        }
    }
}
