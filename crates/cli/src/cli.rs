//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Telemetry fan-out - ordered stream to durable store and live subscribers
#[derive(Parser, Debug)]
#[command(
    name = "telemetry-fanout",
    author,
    version,
    about = "Vehicle telemetry fan-out pipeline",
    long_about = "Ingests vehicle telemetry onto an ordered stream and fans every record out to\n\
                  durable storage (lossless, backpressured) and to live WebSocket subscribers\n\
                  (best effort, drop on overflow)."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TELEMETRY_FANOUT_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TELEMETRY_FANOUT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline and its HTTP surface until Ctrl+C
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Send a simulated vehicle track to a running pipeline
    Simulate(SimulateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "TELEMETRY_FANOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long, env = "TELEMETRY_FANOUT_LISTEN")]
    pub listen: Option<String>,

    /// Use a SQLite store at this path instead of the configured store
    #[arg(long, env = "TELEMETRY_FANOUT_SQLITE")]
    pub sqlite: Option<PathBuf>,

    /// Override the dead-letter file
    #[arg(long, env = "TELEMETRY_FANOUT_DEAD_LETTER")]
    pub dead_letter: Option<PathBuf>,

    /// Metrics server port (0 = disabled)
    #[arg(long, env = "TELEMETRY_FANOUT_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Interval between pipeline metric samples, in milliseconds
    #[arg(long, default_value = "1000", env = "TELEMETRY_FANOUT_SAMPLE_MS")]
    pub sample_ms: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Base URL of a running pipeline
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "TELEMETRY_FANOUT_URL")]
    pub url: String,

    /// Number of simulated vehicles (TRUCK-001, TRUCK-002, ...)
    #[arg(long, default_value = "1")]
    pub vehicles: u32,

    /// Delay between updates, in milliseconds
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,

    /// Updates per vehicle (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    pub count: u64,

    /// Starting latitude
    #[arg(long, default_value = "40.7128", allow_hyphen_values = true)]
    pub lat: f64,

    /// Starting longitude
    #[arg(long, default_value = "-74.0060", allow_hyphen_values = true)]
    pub lon: f64,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
