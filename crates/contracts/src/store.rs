//! Durable store contracts
//!
//! One row per write; duplicates from redelivery are tolerated, not removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractError, Record};

/// A persisted record together with the server-side write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(flatten)]
    pub record: Record,
    pub stored_at: DateTime<Utc>,
}

/// Durable record storage.
#[trait_variant::make(RecordStore: Send)]
pub trait LocalRecordStore {
    /// Store kind (used for logging)
    fn kind(&self) -> &'static str;

    /// Append one row for `record`.
    async fn insert(&self, record: &Record) -> Result<(), ContractError>;

    /// Most recently observed record for `vehicle_id`.
    ///
    /// Ties on `observed_at` resolve to the row inserted last.
    async fn latest(&self, vehicle_id: &str) -> Result<Option<StoredRecord>, ContractError>;
}

/// Destination for records whose persistence failed after every retry.
#[trait_variant::make(DeadLetter: Send)]
pub trait LocalDeadLetter {
    async fn record(&self, record: &Record, reason: &str) -> Result<(), ContractError>;
}
