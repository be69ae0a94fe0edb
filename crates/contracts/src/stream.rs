//! Ordered stream contracts
//!
//! The stream itself (partitioning, offset storage, replication) lives outside
//! the pipeline. These traits are the only surface the pipeline sees.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Position of a message inside the partitioned log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    /// Partition index
    pub partition: u32,
    /// Offset within the partition
    pub offset: u64,
}

/// Raw message fetched from the stream.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Where the message sits in the log
    pub position: StreamPosition,
    /// Message key (the vehicle_id bytes)
    pub key: Bytes,
    /// Encoded record
    pub value: Bytes,
}

/// Consumer side of the ordered stream.
///
/// Committing a message makes every earlier message of the same partition
/// committed as well; a new consumer in the same group resumes after the last
/// committed position.
#[trait_variant::make(RecordStream: Send)]
pub trait LocalRecordStream {
    /// Fetch the next message, waiting until one is available.
    ///
    /// Returns `Ok(None)` once the stream is closed for good.
    ///
    /// # Errors
    /// `ContractError::StreamFetch` for transient failures; callers retry.
    async fn fetch(&mut self) -> Result<Option<StreamMessage>, ContractError>;

    /// Commit the position of `message`.
    async fn commit(&mut self, message: &StreamMessage) -> Result<(), ContractError>;
}

/// Producer side of the ordered stream.
#[trait_variant::make(StreamPublisher: Send)]
pub trait LocalStreamPublisher {
    /// Append a keyed message. Messages sharing a key keep their relative order.
    async fn publish(&self, key: Bytes, value: Bytes) -> Result<StreamPosition, ContractError>;
}

/// Response of the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
}

impl IngestResponse {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
