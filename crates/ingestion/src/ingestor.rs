//! Ingestion endpoint logic
//!
//! Encodes a record and publishes it keyed by vehicle_id. Callers only ever see
//! publish failures; what happens downstream of the stream is invisible here.

use bytes::Bytes;
use contracts::{IngestResponse, Record, StreamPublisher};
use tracing::{debug, error, instrument, warn};

use crate::codec;

/// Publishes incoming records onto the ordered stream.
pub struct Ingestor<P> {
    publisher: P,
}

impl<P: StreamPublisher + Sync> Ingestor<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }

    /// Underlying publisher
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Accept one record. `success` is true only once the stream has it.
    #[instrument(name = "ingestor_ingest", skip(self, record), fields(vehicle_id = %record.vehicle_id))]
    pub async fn ingest(&self, record: Record) -> IngestResponse {
        let value = match codec::encode_record(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Rejected record");
                return IngestResponse::rejected(e.to_string());
            }
        };

        let key = Bytes::from(record.vehicle_id.clone().into_bytes());
        match self.publisher.publish(key, value).await {
            Ok(position) => {
                debug!(
                    partition = position.partition,
                    offset = position.offset,
                    lat = record.latitude,
                    lon = record.longitude,
                    "Ingested"
                );
                IngestResponse::accepted("stored in stream")
            }
            Err(e) => {
                error!(error = %e, "Stream publish failed");
                IngestResponse::rejected(format!("stream publish failed: {e}"))
            }
        }
    }
}
