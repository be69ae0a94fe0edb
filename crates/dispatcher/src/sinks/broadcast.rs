//! BroadcastSink - pushes each record to every live subscriber
//!
//! The record is encoded to JSON once per write. Pushes are sequential, each
//! bounded by `push_timeout`; a subscriber whose push fails or times out is
//! evicted and the loop continues with the rest.
//!
//! A subscriber removed after the snapshot was taken is skipped. Its handle is
//! closed by then and refuses the push anyway.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{BroadcastConfig, CloseReason, ContractError, DataSink, Record};
use tracing::{info, instrument, trace, warn};

use crate::registry::SubscriberRegistry;

pub struct BroadcastSink {
    name: String,
    registry: Arc<SubscriberRegistry>,
    push_timeout: Duration,
}

impl BroadcastSink {
    pub fn new(registry: Arc<SubscriberRegistry>, config: &BroadcastConfig) -> Self {
        Self {
            name: "broadcast".to_string(),
            registry,
            push_timeout: config.push_timeout(),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    fn encode(&self, record: &Record) -> Result<Bytes, ContractError> {
        serde_json::to_vec(record)
            .map(Bytes::from)
            .map_err(|e| ContractError::sink_write(&self.name, format!("encode failed: {e}")))
    }
}

impl DataSink for BroadcastSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "broadcast_sink_write",
        skip(self, record),
        fields(sink = %self.name, vehicle_id = %record.vehicle_id)
    )]
    async fn write(&mut self, record: &Record) -> Result<(), ContractError> {
        let targets = self.registry.snapshot();
        if targets.is_empty() {
            return Ok(());
        }

        let payload = self.encode(record)?;
        let mut delivered = 0usize;

        for (id, connection) in targets {
            if !self.registry.contains(id) {
                continue;
            }
            let pushed = tokio::time::timeout(self.push_timeout, connection.push(payload.clone()));
            let failure = match pushed.await {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("push timed out after {}ms", self.push_timeout.as_millis()),
            };

            warn!(
                subscriber = %id,
                peer = %connection.peer(),
                error = %failure,
                "Push failed, evicting subscriber"
            );
            drop(connection);
            self.registry.evict(id, CloseReason::WriteFailed).await;
        }

        trace!(delivered, "Record broadcast");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        let closed = self.registry.close_all(CloseReason::Shutdown).await;
        info!(sink = %self.name, subscribers = closed, "BroadcastSink closed");
        Ok(())
    }
}
