//! PipelineBlueprint - Config Loader output
//!
//! Describes the complete pipeline configuration: stream, distributor queues,
//! persistence policy, broadcast policy and the outer surfaces.
//! Every section has defaults, so an empty document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Ordered stream consumption
    #[serde(default)]
    pub stream: StreamConfig,

    /// Fan-out queue sizing
    #[serde(default)]
    pub distributor: DistributorConfig,

    /// Persistence sink policy
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Broadcast sink policy
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// HTTP surface (ingest, query, live subscribers)
    #[serde(default)]
    pub server: ServerConfig,

    /// Metrics exporter
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First delay (milliseconds)
    pub initial_ms: u64,

    /// Upper bound for any delay (milliseconds)
    pub max_ms: u64,

    /// Growth factor per attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    2.0
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (0-based), capped at `max_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let millis = (self.initial_ms as f64 * factor).min(self.max_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Stream consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Partition count of the in-process broker
    #[serde(default = "default_partitions")]
    pub partitions: u32,

    /// Consumer group whose committed offsets the reader resumes from
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Retry delay after a transient fetch error
    #[serde(default = "default_fetch_backoff")]
    pub fetch_backoff: BackoffConfig,
}

fn default_partitions() -> u32 {
    4
}

fn default_group_id() -> String {
    "telemetry-fanout".to_string()
}

fn default_fetch_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_ms: 200,
        max_ms: 5_000,
        multiplier: 2.0,
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            group_id: default_group_id(),
            fetch_backoff: default_fetch_backoff(),
        }
    }
}

/// Distributor queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorConfig {
    /// Reader -> distributor handoff capacity
    #[serde(default = "default_queue_capacity")]
    pub input_capacity: usize,

    /// Blocking persistence queue capacity
    #[serde(default = "default_queue_capacity")]
    pub persistence_queue_capacity: usize,

    /// Longest single wait on a full persistence queue (milliseconds)
    #[serde(default = "default_persistence_max_wait_ms")]
    pub persistence_max_wait_ms: u64,

    /// Drop-on-full broadcast queue capacity
    #[serde(default = "default_queue_capacity")]
    pub broadcast_queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_persistence_max_wait_ms() -> u64 {
    500
}

impl DistributorConfig {
    pub fn persistence_max_wait(&self) -> Duration {
        Duration::from_millis(self.persistence_max_wait_ms)
    }
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            input_capacity: default_queue_capacity(),
            persistence_queue_capacity: default_queue_capacity(),
            persistence_max_wait_ms: default_persistence_max_wait_ms(),
            broadcast_queue_capacity: default_queue_capacity(),
        }
    }
}

/// Store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// In-process store (lost on restart)
    #[default]
    Memory,
    /// SQLite file
    Sqlite,
}

/// Persistence sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Store backend
    #[serde(default)]
    pub store: StoreKind,

    /// SQLite database path (required for `sqlite`)
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,

    /// Write attempts per record, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between write attempts
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: BackoffConfig,

    /// Timeout for a single store call (milliseconds)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// JSON-lines dead-letter file (None = log and drop)
    #[serde(default)]
    pub dead_letter_path: Option<PathBuf>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_ms: 50,
        max_ms: 1_000,
        multiplier: 2.0,
    }
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

impl PersistenceConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            sqlite_path: None,
            max_attempts: default_max_attempts(),
            retry_backoff: default_retry_backoff(),
            call_timeout_ms: default_call_timeout_ms(),
            dead_letter_path: None,
        }
    }
}

/// Broadcast sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Per-subscriber push timeout (milliseconds); a timeout counts as a failed write
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,
}

fn default_push_timeout_ms() -> u64 {
    1_000
}

impl BroadcastConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            push_timeout_ms: default_push_timeout_ms(),
        }
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus port (None = disabled)
    #[serde(default)]
    pub port: Option<u16>,
}
