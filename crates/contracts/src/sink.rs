//! DataSink trait - Distributor output interface
//!
//! Defines the abstract interface for sinks.

use crate::{ContractError, Record};

/// Data output trait
///
/// All sink implementations must implement this trait. A sink is driven by a
/// single worker task, so `write` is never called concurrently.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one record
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, record: &Record) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
