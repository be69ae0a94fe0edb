//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::{DispatcherReport, RegistrySnapshot};
use ingestion::ReaderSnapshot;
use observability::PipelineSampleAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Records accepted by the ingestion endpoint
    pub ingested: u64,

    /// Final stream reader counters
    pub reader: ReaderSnapshot,

    /// Final distributor and sink counters
    pub dispatcher: DispatcherReport,

    /// Subscriber lifetime counters
    pub subscribers: RegistrySnapshot,

    /// Periodic queue depth samples
    pub samples: PipelineSampleAggregator,
}

impl PipelineStats {
    /// Records written by the persistence sink
    pub fn persisted(&self) -> u64 {
        self.dispatcher
            .sink("persistence")
            .map(|s| s.write_count)
            .unwrap_or(0)
    }

    /// Records pushed by the broadcast sink
    pub fn broadcast(&self) -> u64 {
        self.dispatcher
            .sink("broadcast")
            .map(|s| s.write_count)
            .unwrap_or(0)
    }

    /// Distributed records per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.dispatcher.distributor.received as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of distributed records that missed the broadcast queue, in percent
    pub fn broadcast_drop_rate(&self) -> f64 {
        let received = self.dispatcher.distributor.received;
        if received > 0 {
            (self.dispatcher.distributor.broadcast_dropped as f64 / received as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Ingested: {}", self.ingested);
        println!("   ├─ Distributed: {}", self.dispatcher.distributor.received);
        println!("   ├─ Persisted: {}", self.persisted());
        println!("   ├─ Broadcast: {}", self.broadcast());
        println!("   └─ Throughput: {:.2} records/s", self.throughput());

        println!("\n📥 Stream Reader");
        println!("   ├─ Fetched: {}", self.reader.fetched);
        println!("   ├─ Handed off: {}", self.reader.handed_off);
        println!("   ├─ Committed: {}", self.reader.committed);
        println!("   ├─ Decode errors: {}", self.reader.decode_errors);
        println!("   └─ Fetch errors: {}", self.reader.fetch_errors);

        println!("\n📤 Sinks");
        for (name, sink) in &self.dispatcher.sinks {
            println!(
                "   ├─ {}: written={} failed={} dropped={} retried={} dead-lettered={}",
                name,
                sink.write_count,
                sink.failure_count,
                sink.dropped_count,
                sink.retry_count,
                sink.dead_letter_count
            );
        }
        println!(
            "   └─ Broadcast drop rate: {:.2}%",
            self.broadcast_drop_rate()
        );

        println!("\n🔌 Subscribers");
        println!("   ├─ Registered: {}", self.subscribers.registered);
        println!("   ├─ Closed: {}", self.subscribers.closed);
        println!("   └─ Failed: {}", self.subscribers.failed);

        if self.samples.samples > 0 {
            println!("\n{}", self.samples.summary());
        }

        println!();
    }
}
