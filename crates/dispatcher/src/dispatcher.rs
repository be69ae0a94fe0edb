//! Dispatcher - fan-out of decoded records to the sinks
//!
//! `Distributor::submit` is the single ingress: persistence first (bounded
//! wait), then broadcast (drop when full). The `Dispatcher` loop drives it from
//! the reader's channel and drains both sinks when that channel closes.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{DeadLetter, DistributorConfig, Record, RecordStore};

use crate::error::DispatcherError;
use crate::handle::{QueuePolicy, SendOutcome, SinkHandle};
use crate::metrics::{DistributorMetrics, DistributorSnapshot, MetricsSnapshot, SinkMetrics};
use crate::sinks::{BroadcastSink, PersistenceSink};

/// How one submitted record was distributed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for both sinks
    Delivered,
    /// Queued for persistence only; the broadcast queue was full
    BroadcastDropped,
}

/// Holds the two sink queues
pub struct Distributor {
    persistence: SinkHandle,
    broadcast: SinkHandle,
    metrics: Arc<DistributorMetrics>,
}

impl Distributor {
    /// Create a distributor over already running sink handles
    pub fn new(persistence: SinkHandle, broadcast: SinkHandle) -> Self {
        if !matches!(persistence.policy(), QueuePolicy::Block { .. }) {
            warn!(
                sink = %persistence.name(),
                "persistence queue does not block, records may be lost"
            );
        }
        Self {
            persistence,
            broadcast,
            metrics: Arc::new(DistributorMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<DistributorMetrics> {
        &self.metrics
    }

    /// Live metrics handles of both sinks, for periodic sampling
    pub fn shared_sink_metrics(&self) -> Vec<(String, Arc<SinkMetrics>)> {
        [&self.persistence, &self.broadcast]
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h.metrics())))
            .collect()
    }

    /// Per-sink metrics
    pub fn sink_metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        [&self.persistence, &self.broadcast]
            .iter()
            .map(|h| {
                let mut snapshot = h.metrics().snapshot();
                snapshot.queue_len = h.queue_len();
                (h.name().to_string(), snapshot)
            })
            .collect()
    }

    /// Forward one record to both sinks.
    ///
    /// # Errors
    /// `Backpressure` when the persistence queue stayed full for the whole
    /// wait; neither sink has the record then and it can be submitted again.
    /// `SinkClosed` when a worker is gone.
    pub async fn submit(&self, record: Arc<Record>) -> Result<SubmitOutcome, DispatcherError> {
        self.persistence.send(Arc::clone(&record)).await?;
        self.metrics.inc_delivered();

        match self.broadcast.send(record).await? {
            SendOutcome::Enqueued => Ok(SubmitOutcome::Delivered),
            SendOutcome::Dropped => {
                self.metrics.inc_broadcast_dropped();
                Ok(SubmitOutcome::BroadcastDropped)
            }
        }
    }

    /// Close both queues and wait until everything queued is written.
    #[instrument(name = "distributor_shutdown", skip(self))]
    pub async fn shutdown(self) -> Vec<(String, MetricsSnapshot)> {
        let persistence_metrics = Arc::clone(self.persistence.metrics());
        let broadcast_metrics = Arc::clone(self.broadcast.metrics());
        let names = [
            self.persistence.name().to_string(),
            self.broadcast.name().to_string(),
        ];

        self.persistence.shutdown().await;
        self.broadcast.shutdown().await;

        let [persistence, broadcast] = names;
        vec![
            (persistence, persistence_metrics.snapshot()),
            (broadcast, broadcast_metrics.snapshot()),
        ]
    }
}

/// Final counters of a dispatcher run
#[derive(Debug, Clone, Default)]
pub struct DispatcherReport {
    pub distributor: DistributorSnapshot,
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

impl DispatcherReport {
    pub fn sink(&self, name: &str) -> Option<&MetricsSnapshot> {
        self.sinks.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }
}

/// Builder for creating a Dispatcher from configuration
pub struct DispatcherBuilder {
    config: DistributorConfig,
    input_rx: async_channel::Receiver<Arc<Record>>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DistributorConfig, input_rx: async_channel::Receiver<Arc<Record>>) -> Self {
        Self { config, input_rx }
    }

    /// Spawn both sink workers and build the dispatcher
    #[instrument(name = "dispatcher_builder_build", skip_all)]
    pub fn build<S, D>(
        self,
        persistence: PersistenceSink<S, D>,
        broadcast: BroadcastSink,
    ) -> Dispatcher
    where
        S: RecordStore + Send + Sync + 'static,
        D: DeadLetter + Send + Sync + 'static,
    {
        let persistence_metrics = persistence.metrics();
        let persistence = SinkHandle::spawn_with_metrics(
            persistence,
            self.config.persistence_queue_capacity,
            QueuePolicy::Block {
                max_wait: self.config.persistence_max_wait(),
            },
            persistence_metrics,
        );
        let broadcast = SinkHandle::spawn(
            broadcast,
            self.config.broadcast_queue_capacity,
            QueuePolicy::DropNewest,
        );

        debug!(
            persistence_capacity = self.config.persistence_queue_capacity,
            broadcast_capacity = self.config.broadcast_queue_capacity,
            "sink workers spawned"
        );

        Dispatcher::new(Distributor::new(persistence, broadcast), self.input_rx)
    }
}

/// The main Dispatcher that fans out records to sinks
pub struct Dispatcher {
    distributor: Distributor,
    input_rx: async_channel::Receiver<Arc<Record>>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn new(distributor: Distributor, input_rx: async_channel::Receiver<Arc<Record>>) -> Self {
        Self {
            distributor,
            input_rx,
        }
    }

    pub fn distributor(&self) -> &Distributor {
        &self.distributor
    }

    /// Run the dispatcher main loop
    ///
    /// `on_ready` fires once, before the first record is taken. Consumes
    /// records until the input channel is closed and drained, then shuts the
    /// sinks down.
    #[instrument(name = "dispatcher_run", skip_all)]
    pub async fn run<F>(self, on_ready: F) -> Result<DispatcherReport, DispatcherError>
    where
        F: FnOnce() + Send,
    {
        let Self {
            distributor,
            input_rx,
        } = self;
        let metrics = Arc::clone(distributor.metrics());

        info!("Dispatcher started");
        on_ready();

        let mut outcome = Ok(());
        'records: while let Ok(record) = input_rx.recv().await {
            metrics.inc_received();

            loop {
                match distributor.submit(Arc::clone(&record)).await {
                    Ok(_) => break,
                    Err(e) if e.is_backpressure() => {
                        metrics.inc_backpressure_retries();
                        warn!(
                            vehicle_id = %record.vehicle_id,
                            error = %e,
                            "Persistence queue full, resubmitting"
                        );
                    }
                    Err(e) => {
                        error!(vehicle_id = %record.vehicle_id, error = %e, "Distribution stopped");
                        outcome = Err(e);
                        break 'records;
                    }
                }
            }

            let received = metrics.snapshot().received;
            if received.is_multiple_of(100) {
                debug!(records = received, "Dispatcher progress");
            }
        }

        info!(
            records = metrics.snapshot().received,
            "Dispatcher input closed, draining sinks"
        );

        let sinks = distributor.shutdown().await;
        let report = DispatcherReport {
            distributor: metrics.snapshot(),
            sinks,
        };

        info!(distributor = ?report.distributor, "Dispatcher shutdown complete");
        outcome.map(|()| report)
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn<F>(self, on_ready: F) -> JoinHandle<Result<DispatcherReport, DispatcherError>>
    where
        F: FnOnce() + Send + 'static,
    {
        tokio::spawn(async move { self.run(on_ready).await })
    }
}
