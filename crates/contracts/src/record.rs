//! Record - the decoded telemetry unit passed between all stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// One telemetry sample for a vehicle.
///
/// Immutable once decoded. Sinks receive it behind an `Arc` and never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Partition and ordering key (non-empty)
    pub vehicle_id: String,

    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Speed reported by the vehicle
    pub speed: f64,

    /// Engine temperature reported by the vehicle
    pub engine_temp: f64,

    /// Vehicle-side observation time
    pub observed_at: DateTime<Utc>,
}

impl Record {
    /// Check the record invariants that the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.vehicle_id.is_empty() {
            return Err(ContractError::invalid_record("vehicle_id cannot be empty"));
        }
        Ok(())
    }
}
