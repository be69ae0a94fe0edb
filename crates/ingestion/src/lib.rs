//! # Ingestion
//!
//! Stream-side half of the pipeline.
//!
//! Responsibilities:
//! - Length-prefixed record codec for stream values
//! - `StreamReader`: fetch, decode, hand off to the distributor, commit
//! - Readiness barrier between distributor startup and the first fetch
//! - `Ingestor`: the publish side used by the ingestion endpoint
//! - `MemoryBroker`: in-process partitioned log for local runs and tests
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{readiness, MemoryBroker, ReaderConfig, StreamReader};
//!
//! let broker = MemoryBroker::new(4);
//! let (signal, ready) = readiness();
//! let (tx, rx) = async_channel::bounded(100);
//!
//! let reader = StreamReader::new(broker.consumer("telemetry-fanout"), ReaderConfig::default());
//! tokio::spawn(reader.run(tx, ready, cancel.clone()));
//! // the distributor consumes `rx` and calls `signal.mark_ready()` once its sinks run
//! ```

mod broker;
pub mod codec;
mod config;
mod error;
mod ingestor;
mod reader;

// Re-exports
pub use broker::{MemoryBroker, MemoryStream};
pub use config::{ReaderConfig, ReaderMetrics, ReaderSnapshot};
pub use contracts::Record;
pub use error::{IngestionError, Result};
pub use ingestor::Ingestor;
pub use reader::{readiness, ReadySignal, Readiness, StreamReader};
