//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, trace, warn};

use contracts::{DataSink, Record};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

/// What the sender does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Wait for space, at most `max_wait`
    Block { max_wait: Duration },
    /// Discard the incoming record
    DropNewest,
}

/// Result of handing a record to a sink queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Enqueued,
    Dropped,
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    policy: QueuePolicy,
    /// Channel to send records to worker
    tx: mpsc::Sender<Arc<Record>>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: DataSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        policy: QueuePolicy,
    ) -> Self {
        Self::spawn_with_metrics(sink, queue_capacity, policy, Arc::new(SinkMetrics::new()))
    }

    /// Like [`SinkHandle::spawn`], sharing metrics the sink also updates
    pub fn spawn_with_metrics<S: DataSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        policy: QueuePolicy,
        metrics: Arc<SinkMetrics>,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            policy,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Records currently queued
    pub fn queue_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Hand a record to the sink according to its queue policy.
    ///
    /// `Block`: waits for space at most `max_wait`, then fails with
    /// `Backpressure` without enqueuing. `DropNewest`: never waits; a full
    /// queue drops the record and counts it.
    pub async fn send(&self, record: Arc<Record>) -> Result<SendOutcome, DispatcherError> {
        match self.policy {
            QueuePolicy::Block { max_wait } => {
                let permit = match tokio::time::timeout(max_wait, self.tx.reserve()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(DispatcherError::sink_closed(&self.name)),
                    Err(_) => {
                        return Err(DispatcherError::Backpressure {
                            sink_name: self.name.clone(),
                            waited_ms: max_wait.as_millis() as u64,
                        })
                    }
                };
                permit.send(record);
                self.metrics.set_queue_len(self.queue_len());
                Ok(SendOutcome::Enqueued)
            }
            QueuePolicy::DropNewest => Ok(self.try_send(record)),
        }
    }

    /// Send a record to the sink (non-blocking)
    ///
    /// A full queue drops the record; a closed worker is logged.
    pub fn try_send(&self, record: Arc<Record>) -> SendOutcome {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.metrics.set_queue_len(self.queue_len());
                SendOutcome::Enqueued
            }
            Err(mpsc::error::TrySendError::Full(r)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    sink = %self.name,
                    vehicle_id = %r.vehicle_id,
                    "Queue full, record dropped"
                );
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                SendOutcome::Dropped
            }
        }
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Queued records are still written before the sink is closed.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        // Wait for worker to finish
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes records and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<Record>>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(record) = rx.recv().await {
        // Update queue length
        metrics.set_queue_len(rx.len());

        match sink.write(&record).await {
            Ok(()) => {
                metrics.inc_write_count();
                trace!(sink = %name, vehicle_id = %record.vehicle_id, "Record written");
            }
            Err(e) => {
                metrics.inc_failure_count();
                error!(
                    sink = %name,
                    vehicle_id = %record.vehicle_id,
                    error = %e,
                    "Write failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
    }

    // Cleanup
    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
