//! Sink and distributor metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Total successful writes
    write_count: AtomicU64,
    /// Total write failures
    failure_count: AtomicU64,
    /// Total records dropped due to full queue
    dropped_count: AtomicU64,
    /// Total store retries
    retry_count: AtomicU64,
    /// Total records routed to the dead letter
    dead_letter_count: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get total write count
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Increment write count
    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get failure count
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Increment failure count
    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get dropped count
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Increment dropped count
    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn inc_retry_count(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dead_letter_count(&self) -> u64 {
        self.dead_letter_count.load(Ordering::Relaxed)
    }

    pub fn inc_dead_letter_count(&self) {
        self.dead_letter_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
            retry_count: self.retry_count(),
            dead_letter_count: self.dead_letter_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub retry_count: u64,
    pub dead_letter_count: u64,
}

/// Counters of the distributor loop
#[derive(Debug, Default)]
pub struct DistributorMetrics {
    received: AtomicU64,
    delivered: AtomicU64,
    broadcast_dropped: AtomicU64,
    backpressure_retries: AtomicU64,
}

impl DistributorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_broadcast_dropped(&self) {
        self.broadcast_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_backpressure_retries(&self) {
        self.backpressure_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DistributorSnapshot {
        DistributorSnapshot {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            broadcast_dropped: self.broadcast_dropped.load(Ordering::Relaxed),
            backpressure_retries: self.backpressure_retries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of distributor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributorSnapshot {
    /// Records taken from the input
    pub received: u64,
    /// Records accepted by the persistence queue
    pub delivered: u64,
    /// Records that did not fit the broadcast queue
    pub broadcast_dropped: u64,
    /// Submissions repeated after the persistence wait elapsed
    pub backpressure_retries: u64,
}
