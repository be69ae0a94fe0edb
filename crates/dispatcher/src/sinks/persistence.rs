//! PersistenceSink - writes each record to the durable store
//!
//! Every store call is bounded by `call_timeout`. A failed record is retried
//! `max_attempts` times in total with backoff, then handed to the dead letter
//! (when one is configured) and the sink moves on.

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    BackoffConfig, ContractError, DataSink, DeadLetter, PersistenceConfig, Record, RecordStore,
};
use tracing::{debug, error, instrument, warn};

use crate::metrics::SinkMetrics;

pub struct PersistenceSink<S, D> {
    name: String,
    store: Arc<S>,
    dead_letter: Option<Arc<D>>,
    max_attempts: u32,
    retry_backoff: BackoffConfig,
    call_timeout: Duration,
    metrics: Arc<SinkMetrics>,
}

impl<S, D> PersistenceSink<S, D>
where
    S: RecordStore + Send + Sync + 'static,
    D: DeadLetter + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>, dead_letter: Option<Arc<D>>, config: &PersistenceConfig) -> Self {
        Self {
            name: "persistence".to_string(),
            store,
            dead_letter,
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff,
            call_timeout: config.call_timeout(),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    /// Metrics shared with the worker's `SinkHandle`
    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }

    async fn insert_once(&self, record: &Record) -> Result<(), String> {
        match tokio::time::timeout(self.call_timeout, self.store.insert(record)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "{} store call timed out after {}ms",
                self.store.kind(),
                self.call_timeout.as_millis()
            )),
        }
    }

    async fn give_up(&self, record: &Record, reason: String) -> ContractError {
        match &self.dead_letter {
            Some(dead_letter) => match dead_letter.record(record, &reason).await {
                Ok(()) => {
                    self.metrics.inc_dead_letter_count();
                    warn!(
                        sink = %self.name,
                        vehicle_id = %record.vehicle_id,
                        reason = %reason,
                        "Record routed to dead letter"
                    );
                }
                Err(e) => {
                    error!(
                        sink = %self.name,
                        vehicle_id = %record.vehicle_id,
                        error = %e,
                        "Dead letter write failed, record lost"
                    );
                }
            },
            None => {
                error!(
                    sink = %self.name,
                    vehicle_id = %record.vehicle_id,
                    reason = %reason,
                    "No dead letter configured, record skipped"
                );
            }
        }
        ContractError::sink_write(
            &self.name,
            format!("gave up after {} attempts: {reason}", self.max_attempts),
        )
    }
}

impl<S, D> DataSink for PersistenceSink<S, D>
where
    S: RecordStore + Send + Sync + 'static,
    D: DeadLetter + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "persistence_sink_write",
        skip(self, record),
        fields(sink = %self.name, vehicle_id = %record.vehicle_id)
    )]
    async fn write(&mut self, record: &Record) -> Result<(), ContractError> {
        let mut last_error = String::new();

        for attempt in 0..self.max_attempts {
            match self.insert_once(record).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(attempt, "Store write succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) => last_error = e,
            }

            if attempt + 1 < self.max_attempts {
                self.metrics.inc_retry_count();
                let delay = self.retry_backoff.delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Store write failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(self.give_up(record, last_error).await)
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, store = self.store.kind(), "PersistenceSink closed");
        Ok(())
    }
}
