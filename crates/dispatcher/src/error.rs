//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Blocking queue stayed full for the whole wait; nothing was enqueued
    #[error("queue for sink '{sink_name}' stayed full for {waited_ms}ms")]
    Backpressure { sink_name: String, waited_ms: u64 },

    /// Worker is gone and the queue no longer accepts records
    #[error("sink '{sink_name}' is closed")]
    SinkClosed { sink_name: String },

    /// Sink write error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    pub fn sink_closed(sink_name: impl Into<String>) -> Self {
        Self::SinkClosed {
            sink_name: sink_name.into(),
        }
    }

    /// True when the same record can simply be submitted again.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::Backpressure { .. })
    }
}
