//! Reader configuration and metrics

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{BackoffConfig, StreamConfig};

/// Stream reader configuration
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Delay schedule after transient fetch errors
    pub fetch_backoff: BackoffConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for ReaderConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            fetch_backoff: config.fetch_backoff,
        }
    }
}

/// Reader metrics
#[derive(Debug, Default)]
pub struct ReaderMetrics {
    /// Messages fetched from the stream
    pub fetched: AtomicU64,

    /// Records handed to the distributor
    pub handed_off: AtomicU64,

    /// Messages dropped as undecodable
    pub decode_errors: AtomicU64,

    /// Transient fetch failures
    pub fetch_errors: AtomicU64,

    /// Successful commits
    pub committed: AtomicU64,

    /// Failed commits
    pub commit_errors: AtomicU64,
}

impl ReaderMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handed_off(&self) {
        self.handed_off.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_error(&self) {
        self.commit_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> ReaderSnapshot {
        ReaderSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            handed_off: self.handed_off.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            commit_errors: self.commit_errors.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderSnapshot {
    pub fetched: u64,
    pub handed_off: u64,
    pub decode_errors: u64,
    pub fetch_errors: u64,
    pub committed: u64,
    pub commit_errors: u64,
}
