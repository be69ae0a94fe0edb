//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, StoreKind};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
///
/// The in-process broker keeps a message only until the dispatcher's consumer
/// group has committed past it, so memory follows the uncommitted backlog.
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let blueprint = load_blueprint(args)?;

    info!(
        listen = %blueprint.server.listen_addr,
        store = ?blueprint.persistence.store,
        partitions = blueprint.stream.partitions,
        persistence_capacity = blueprint.distributor.persistence_queue_capacity,
        broadcast_capacity = blueprint.distributor.broadcast_queue_capacity,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        metrics_port: blueprint.metrics.port,
        blueprint,
        sample_interval: Duration::from_millis(args.sample_ms.max(10)),
    };

    // Setup graceful shutdown handler
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        setup_shutdown_signal().await;
        warn!("Received shutdown signal, draining pipeline...");
        signal_token.cancel();
    });

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown)
        .await
        .context("Pipeline execution failed")?;

    info!(
        ingested = stats.ingested,
        persisted = stats.persisted(),
        broadcast_dropped = stats.dispatcher.distributor.broadcast_dropped,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline stopped"
    );

    // Print detailed statistics
    stats.print_summary();

    info!("Telemetry fan-out finished");
    Ok(())
}

/// Load configuration (or defaults) and apply CLI overrides
fn load_blueprint(args: &RunArgs) -> Result<PipelineBlueprint> {
    let mut blueprint = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration file given, using defaults");
            PipelineBlueprint::default()
        }
    };

    // Apply CLI overrides
    if let Some(ref listen) = args.listen {
        info!(listen = %listen, "Overriding listen address from CLI");
        blueprint.server.listen_addr = listen.clone();
    }
    if let Some(ref path) = args.sqlite {
        info!(path = %path.display(), "Using SQLite store from CLI");
        blueprint.persistence.store = StoreKind::Sqlite;
        blueprint.persistence.sqlite_path = Some(path.clone());
    }
    if let Some(ref path) = args.dead_letter {
        blueprint.persistence.dead_letter_path = Some(path.clone());
    }
    if let Some(port) = args.metrics_port {
        blueprint.metrics.port = (port != 0).then_some(port);
    }

    config_loader::ConfigLoader::validate(&blueprint)
        .context("Configuration invalid after CLI overrides")?;
    Ok(blueprint)
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &PipelineBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Stream:");
    println!("  Partitions: {}", blueprint.stream.partitions);
    println!("  Consumer group: {}", blueprint.stream.group_id);

    println!("\nDistributor:");
    println!("  Input capacity: {}", blueprint.distributor.input_capacity);
    println!(
        "  Persistence queue: {} (max wait {}ms)",
        blueprint.distributor.persistence_queue_capacity,
        blueprint.distributor.persistence_max_wait_ms
    );
    println!(
        "  Broadcast queue: {} (drop on full)",
        blueprint.distributor.broadcast_queue_capacity
    );

    println!("\nPersistence:");
    println!("  Store: {:?}", blueprint.persistence.store);
    if let Some(ref path) = blueprint.persistence.sqlite_path {
        println!("  SQLite path: {}", path.display());
    }
    println!(
        "  Attempts: {} (call timeout {}ms)",
        blueprint.persistence.max_attempts, blueprint.persistence.call_timeout_ms
    );
    match blueprint.persistence.dead_letter_path {
        Some(ref path) => println!("  Dead letter: {}", path.display()),
        None => println!("  Dead letter: disabled"),
    }

    println!("\nServer:");
    println!("  Listen: {}", blueprint.server.listen_addr);
    println!(
        "  Push timeout: {}ms",
        blueprint.broadcast.push_timeout_ms
    );
    if let Some(port) = blueprint.metrics.port {
        println!("  Metrics port: {}", port);
    }

    println!();
}
