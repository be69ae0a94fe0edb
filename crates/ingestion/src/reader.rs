//! Stream reader
//!
//! Fetch -> decode -> hand off -> commit, strictly in that order, one message
//! at a time. A message is committed only after its record reached the
//! distributor input (or after it was dropped as undecodable), so a crash
//! between handoff and commit redelivers it: at-least-once.

use std::sync::Arc;

use async_channel::Sender;
use contracts::{Record, RecordStream, StreamMessage};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::codec;
use crate::config::{ReaderConfig, ReaderMetrics, ReaderSnapshot};
use crate::error::{IngestionError, Result};

/// Create a readiness pair.
///
/// The distributor side raises the signal once its sink workers run; the
/// reader waits on it before the first fetch.
pub fn readiness() -> (ReadySignal, Readiness) {
    let (tx, rx) = watch::channel(false);
    (ReadySignal(tx), Readiness(rx))
}

/// Raising half of the readiness barrier
#[derive(Debug)]
pub struct ReadySignal(watch::Sender<bool>);

impl ReadySignal {
    pub fn mark_ready(&self) {
        self.0.send_replace(true);
    }
}

/// Waiting half of the readiness barrier
#[derive(Debug, Clone)]
pub struct Readiness(watch::Receiver<bool>);

impl Readiness {
    /// Already-raised barrier, for callers that wire things up synchronously
    pub fn ready() -> Self {
        let (signal, readiness) = readiness();
        signal.mark_ready();
        readiness
    }

    pub fn is_ready(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait until the signal is raised.
    ///
    /// # Errors
    /// `DistributorNotReady` if the signal was dropped without being raised.
    pub async fn wait(&mut self) -> Result<()> {
        self.0
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| IngestionError::DistributorNotReady)
    }
}

/// Consumes one ordered stream and feeds the distributor input.
pub struct StreamReader<S> {
    stream: S,
    config: ReaderConfig,
    metrics: Arc<ReaderMetrics>,
}

impl<S: RecordStream> StreamReader<S> {
    pub fn new(stream: S, config: ReaderConfig) -> Self {
        Self {
            stream,
            config,
            metrics: Arc::new(ReaderMetrics::new()),
        }
    }

    /// Shared metrics handle
    pub fn metrics(&self) -> Arc<ReaderMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until the stream ends or `cancel` fires.
    ///
    /// Dropping `output` on return closes the distributor input, which lets
    /// the distributor drain and stop.
    #[instrument(name = "stream_reader_run", skip_all)]
    pub async fn run(
        mut self,
        output: Sender<Arc<Record>>,
        mut readiness: Readiness,
        cancel: CancellationToken,
    ) -> Result<ReaderSnapshot> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Reader cancelled before distributor was ready");
                return Ok(self.metrics.snapshot());
            }
            ready = readiness.wait() => ready?,
        }

        info!("Stream reader started");
        let mut failures: u32 = 0;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, reader stops fetching");
                    break;
                }
                fetched = self.stream.fetch() => fetched,
            };

            match fetched {
                Ok(Some(message)) => {
                    failures = 0;
                    if !self.forward(message, &output, &cancel).await? {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Stream closed");
                    break;
                }
                Err(e) if e.is_transient() => {
                    self.metrics.record_fetch_error();
                    let delay = self.config.fetch_backoff.delay(failures);
                    failures = failures.saturating_add(1);
                    warn!(
                        error = %e,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "Fetch failed permanently");
                    return Err(e.into());
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        info!(
            fetched = snapshot.fetched,
            handed_off = snapshot.handed_off,
            decode_errors = snapshot.decode_errors,
            "Stream reader stopped"
        );
        Ok(snapshot)
    }

    /// Returns `false` when cancelled mid-handoff.
    async fn forward(
        &mut self,
        message: StreamMessage,
        output: &Sender<Arc<Record>>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.metrics.record_fetched();
        let partition = message.position.partition;
        let offset = message.position.offset;

        match codec::decode_message(&message) {
            Ok(record) => {
                tokio::select! {
                    biased;
                    sent = output.send(Arc::new(record)) => {
                        if sent.is_err() {
                            return Err(IngestionError::DistributorClosed { pending: 1 });
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!(partition, offset, "Cancelled during handoff, message left uncommitted");
                        return Ok(false);
                    }
                }
                self.metrics.record_handed_off();
            }
            Err(e) => {
                self.metrics.record_decode_error();
                warn!(partition, offset, error = %e, "Dropping undecodable message");
            }
        }

        self.commit(&message).await;
        Ok(true)
    }

    async fn commit(&mut self, message: &StreamMessage) {
        match self.stream.commit(message).await {
            Ok(()) => {
                self.metrics.record_committed();
                debug!(
                    partition = message.position.partition,
                    offset = message.position.offset,
                    "Committed"
                );
            }
            Err(e) => {
                // the next successful commit covers this position
                self.metrics.record_commit_error();
                warn!(error = %e, "Commit failed");
            }
        }
    }
}
