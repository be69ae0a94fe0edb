//! `simulate` command implementation.
//!
//! Drives one or more fake trucks along a random walk and posts every
//! position to the ingestion endpoint.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use contracts::{IngestResponse, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::cli::SimulateArgs;
use crate::error::CliError;

/// Maximum position change per tick, in degrees
const STEP_DEGREES: f64 = 0.0005;

/// Random-walk track of one vehicle
pub struct TrackSimulator {
    vehicle_id: String,
    lat: f64,
    lon: f64,
    rng: StdRng,
}

impl TrackSimulator {
    pub fn new(vehicle_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            lat,
            lon,
            rng: StdRng::from_os_rng(),
        }
    }

    #[cfg(test)]
    fn seeded(vehicle_id: &str, lat: f64, lon: f64, seed: u64) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            lat,
            lon,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Advance one tick and produce the observation.
    pub fn next_record(&mut self) -> Record {
        self.lat += self.rng.random_range(-STEP_DEGREES..=STEP_DEGREES);
        self.lon += self.rng.random_range(-STEP_DEGREES..=STEP_DEGREES);

        Record {
            vehicle_id: self.vehicle_id.clone(),
            latitude: self.lat,
            longitude: self.lon,
            speed: self.rng.random_range(30.0..=65.0),
            engine_temp: self.rng.random_range(180.0..=210.0),
            observed_at: Utc::now(),
        }
    }
}

/// Execute the `simulate` command
pub async fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let endpoint = format!("{}/telemetry", args.url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let mut trucks: Vec<TrackSimulator> = (1..=args.vehicles.max(1))
        .map(|n| TrackSimulator::new(format!("TRUCK-{n:03}"), args.lat, args.lon))
        .collect();

    info!(
        endpoint = %endpoint,
        vehicles = trucks.len(),
        interval_ms = args.interval_ms,
        "Starting telemetry simulator"
    );

    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut ticks: u64 = 0;
    let mut sent: u64 = 0;
    let mut failed: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Simulator interrupted");
                break;
            }
            _ = interval.tick() => {}
        }

        for truck in &mut trucks {
            let record = truck.next_record();
            match post_record(&client, &endpoint, &record).await {
                Ok(response) if response.success => {
                    sent += 1;
                    info!(
                        vehicle_id = %record.vehicle_id,
                        lat = format_args!("{:.6}", record.latitude),
                        lon = format_args!("{:.6}", record.longitude),
                        speed = format_args!("{:.1}", record.speed),
                        "Sent"
                    );
                }
                Ok(response) => {
                    failed += 1;
                    warn!(vehicle_id = %record.vehicle_id, message = %response.message, "Rejected");
                }
                Err(e) => {
                    failed += 1;
                    warn!(vehicle_id = %record.vehicle_id, error = %e, "Send failed");
                }
            }
        }

        ticks += 1;
        if args.count > 0 && ticks >= args.count {
            break;
        }
    }

    info!(ticks, sent, failed, "Simulator finished");
    Ok(())
}

async fn post_record(
    client: &reqwest::Client,
    endpoint: &str,
    record: &Record,
) -> Result<IngestResponse, CliError> {
    let body = serde_json::to_vec(record).map_err(|e| CliError::ingest(endpoint, e.to_string()))?;

    let response = client
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| CliError::ingest(endpoint, e.to_string()))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CliError::ingest(endpoint, e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| CliError::ingest(endpoint, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_walk_stays_within_step() {
        let mut sim = TrackSimulator::seeded("TRUCK-001", 40.7128, -74.0060, 7);
        let mut prev = (40.7128, -74.0060);

        for _ in 0..200 {
            let record = sim.next_record();
            assert!((record.latitude - prev.0).abs() <= STEP_DEGREES + 1e-12);
            assert!((record.longitude - prev.1).abs() <= STEP_DEGREES + 1e-12);
            prev = (record.latitude, record.longitude);
        }
    }

    #[test]
    fn test_speed_and_temperature_ranges() {
        let mut sim = TrackSimulator::seeded("TRUCK-002", 0.0, 0.0, 42);
        for _ in 0..200 {
            let record = sim.next_record();
            assert_eq!(record.vehicle_id, "TRUCK-002");
            assert!((30.0..=65.0).contains(&record.speed));
            assert!((180.0..=210.0).contains(&record.engine_temp));
            assert!(record.validate().is_ok());
        }
    }
}
