//! Pipeline orchestrator - coordinates all components.
//!
//! Startup: store -> listener -> dispatcher (raises readiness) -> reader ->
//! HTTP server -> sampler. Shutdown runs the other way round: the reader stops
//! fetching, the dispatcher drains both sink queues and closes every
//! subscriber, then the HTTP server stops and the broker is closed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, RecordStore};
use dispatcher::{
    BroadcastSink, DispatcherBuilder, PersistenceSink, SinkMetrics, SubscriberRegistry,
};
use ingestion::{Ingestor, MemoryBroker, ReaderConfig, ReaderMetrics, StreamReader};
use observability::{
    record_reader_totals, record_sink_totals, record_subscribers, PipelineSample,
    PipelineSampleAggregator, ReaderTotals, SinkTotals,
};
use store::{AnyStore, FileDeadLetter};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::PipelineStats;
use crate::error::CliError;
use crate::http::{self, AppState};

/// Grace period for the HTTP server to close its connections
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The pipeline blueprint
    pub blueprint: PipelineBlueprint,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// How often queue depths and counters are sampled
    pub sample_interval: Duration,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` fires (or the stream ends), then drain.
    pub async fn run(self, shutdown: CancellationToken) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Storage
        let store = Arc::new(
            AnyStore::from_config(&blueprint.persistence).context("Failed to open record store")?,
        );
        let dead_letter: Option<Arc<FileDeadLetter>> = match &blueprint.persistence.dead_letter_path
        {
            Some(path) => Some(Arc::new(
                FileDeadLetter::open(path).context("Failed to open dead-letter file")?,
            )),
            None => None,
        };
        info!(
            store = store.kind(),
            dead_letter = ?blueprint.persistence.dead_letter_path,
            "Record store ready"
        );

        // Bind early so a busy port fails before anything is spawned
        let addr = blueprint.server.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| CliError::bind(&addr, e.to_string()))?;

        // Stream and ingestion
        let broker = MemoryBroker::with_retention(blueprint.stream.partitions);
        let ingestor = Arc::new(Ingestor::new(broker.clone()));
        let registry = Arc::new(SubscriberRegistry::with_close_timeout(
            blueprint.broadcast.push_timeout(),
        ));

        // Dispatcher
        info!("Setting up dispatcher...");
        let (input_tx, input_rx) = async_channel::bounded(blueprint.distributor.input_capacity);
        let (ready_signal, readiness) = ingestion::readiness();

        let persistence = PersistenceSink::new(
            Arc::clone(&store),
            dead_letter,
            &blueprint.persistence,
        );
        let broadcast = BroadcastSink::new(Arc::clone(&registry), &blueprint.broadcast);
        let dispatcher = DispatcherBuilder::new(blueprint.distributor.clone(), input_rx)
            .build(persistence, broadcast);
        let sink_metrics = dispatcher.distributor().shared_sink_metrics();
        let dispatcher_handle = dispatcher.spawn(move || ready_signal.mark_ready());

        // Reader
        let reader = StreamReader::new(
            broker.consumer(blueprint.stream.group_id.clone()),
            ReaderConfig::from(&blueprint.stream),
        );
        let reader_metrics = reader.metrics();
        let reader_cancel = shutdown.child_token();
        let mut reader_handle =
            tokio::spawn(reader.run(input_tx, readiness, reader_cancel.clone()));

        info!(
            partitions = broker.partition_count(),
            group = %blueprint.stream.group_id,
            "Stream reader started"
        );

        // HTTP
        let server_shutdown = CancellationToken::new();
        let state = AppState::new(
            ingestor,
            Arc::clone(&store),
            Arc::clone(&registry),
            server_shutdown.clone(),
        );
        let server_handle = tokio::spawn(http::serve(
            listener,
            state.clone(),
            server_shutdown.clone(),
        ));

        // Sampler
        let sampler_stop = CancellationToken::new();
        let sampler_handle = tokio::spawn(run_sampler(
            self.config.sample_interval,
            Arc::clone(&reader_metrics),
            sink_metrics.clone(),
            Arc::clone(&registry),
            sampler_stop.clone(),
        ));

        info!(listen = %addr, "Pipeline running");

        // Wait for shutdown or an early reader exit
        let reader_result = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutting down pipeline...");
                reader_cancel.cancel();
                (&mut reader_handle).await
            }
            result = &mut reader_handle => {
                warn!("Stream reader stopped before shutdown was requested");
                result
            }
        };
        let reader_error = match reader_result {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                error!(error = %e, "Stream reader failed");
                Some(CliError::task("stream_reader", e.to_string()))
            }
            Err(e) => Some(CliError::task("stream_reader", e.to_string())),
        };

        // The reader dropped the input sender; the dispatcher drains and stops
        let dispatcher_report = match dispatcher_handle.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(error = %e, "Dispatcher failed");
                return Err(CliError::task("dispatcher", e.to_string()).into());
            }
            Err(e) => return Err(CliError::task("dispatcher", e.to_string()).into()),
        };

        server_shutdown.cancel();
        match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server_handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server stopped with error"),
            Ok(Err(e)) => warn!(error = %e, "HTTP server task failed"),
            Err(_) => warn!("HTTP server did not stop in time"),
        }
        broker.close();

        sampler_stop.cancel();
        let samples = sampler_handle.await.unwrap_or_default();

        // Final sync so the exporter matches the summary
        sample_once(&reader_metrics, &sink_metrics, &registry);

        if let Some(e) = reader_error {
            return Err(e.into());
        }

        let stats = PipelineStats {
            duration: start_time.elapsed(),
            ingested: state.ingested(),
            reader: reader_metrics.snapshot(),
            dispatcher: dispatcher_report,
            subscribers: registry.stats(),
            samples,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            throughput = format!("{:.2}", stats.throughput()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Periodically export counters and aggregate queue depths.
async fn run_sampler(
    interval: Duration,
    reader: Arc<ReaderMetrics>,
    sinks: Vec<(String, Arc<SinkMetrics>)>,
    registry: Arc<SubscriberRegistry>,
    stop: CancellationToken,
) -> PipelineSampleAggregator {
    let mut aggregator = PipelineSampleAggregator::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let sample = sample_once(&reader, &sinks, &registry);
                aggregator.update(&sample);
            }
        }
    }

    aggregator
}

fn sample_once(
    reader: &ReaderMetrics,
    sinks: &[(String, Arc<SinkMetrics>)],
    registry: &SubscriberRegistry,
) -> PipelineSample {
    let reader = reader.snapshot();
    record_reader_totals(&ReaderTotals {
        fetched: reader.fetched,
        handed_off: reader.handed_off,
        decode_errors: reader.decode_errors,
        fetch_errors: reader.fetch_errors,
        committed: reader.committed,
    });

    let mut sample = PipelineSample::default();
    for (name, metrics) in sinks {
        let snapshot = metrics.snapshot();
        record_sink_totals(
            name,
            &SinkTotals {
                queue_len: snapshot.queue_len,
                written: snapshot.write_count,
                failed: snapshot.failure_count,
                dropped: snapshot.dropped_count,
                retried: snapshot.retry_count,
                dead_lettered: snapshot.dead_letter_count,
            },
        );
        match name.as_str() {
            "persistence" => sample.persistence_queue = snapshot.queue_len,
            "broadcast" => sample.broadcast_queue = snapshot.queue_len,
            _ => {}
        }
    }

    sample.subscribers = registry.len();
    record_subscribers(sample.subscribers);
    sample
}
