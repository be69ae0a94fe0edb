//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, StoreKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    partitions: u32,
    store: String,
    persistence_queue_capacity: usize,
    broadcast_queue_capacity: usize,
    max_attempts: u32,
    listen_addr: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    partitions: blueprint.stream.partitions,
                    store: format!("{:?}", blueprint.persistence.store),
                    persistence_queue_capacity: blueprint.distributor.persistence_queue_capacity,
                    broadcast_queue_capacity: blueprint.distributor.broadcast_queue_capacity,
                    max_attempts: blueprint.persistence.max_attempts,
                    listen_addr: blueprint.server.listen_addr.clone(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.persistence.store == StoreKind::Memory {
        warnings.push("persistence.store is memory - records are lost on exit".to_string());
    }

    if blueprint.persistence.dead_letter_path.is_none() {
        warnings.push(
            "persistence.dead_letter_path is not set - records failing every retry are dropped"
                .to_string(),
        );
    }

    if blueprint.distributor.input_capacity < blueprint.distributor.persistence_queue_capacity {
        warnings.push(
            "distributor.input_capacity is smaller than the persistence queue - backpressure reaches the reader early"
                .to_string(),
        );
    }

    if blueprint.broadcast.push_timeout_ms > blueprint.distributor.persistence_max_wait_ms * 10 {
        warnings.push(
            "broadcast.push_timeout_ms is large - one stalled subscriber delays every other one"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Partitions: {}", summary.partitions);
            println!("  Store: {}", summary.store);
            println!(
                "  Queues: persistence={} broadcast={}",
                summary.persistence_queue_capacity, summary.broadcast_queue_capacity
            );
            println!("  Max attempts: {}", summary.max_attempts);
            println!("  Listen: {}", summary.listen_addr);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
