//! SqliteStore - single-table record storage
//!
//! The connection sits behind a mutex and every call runs on the blocking
//! pool. Timestamps are stored as fixed-width RFC 3339 text so that ordering
//! by the column is chronological.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use contracts::{ContractError, Record, RecordStore, StoredRecord};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::StoreError;

const KIND: &str = "sqlite";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vehicle_locations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id  TEXT NOT NULL,
    latitude    REAL NOT NULL,
    longitude   REAL NOT NULL,
    speed       REAL NOT NULL,
    engine_temp REAL NOT NULL,
    observed_at TEXT NOT NULL,
    stored_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vehicle_locations_latest
    ON vehicle_locations (vehicle_id, observed_at);
";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "sqlite store opened");
        Ok(store)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of rows stored for `vehicle_id`.
    pub async fn count(&self, vehicle_id: &str) -> Result<u64, ContractError> {
        let vehicle_id = vehicle_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM vehicle_locations WHERE vehicle_id = ?1",
                params![vehicle_id],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, ContractError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ContractError::store(KIND, "connection mutex poisoned"))?;
            f(&guard).map_err(sql_error)
        })
        .await
        .map_err(|e| ContractError::store(KIND, format!("blocking task failed: {e}")))?
    }
}

impl RecordStore for SqliteStore {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn insert(&self, record: &Record) -> Result<(), ContractError> {
        let record = record.clone();
        let stored_at = format_ts(Utc::now());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO vehicle_locations \
                 (vehicle_id, latitude, longitude, speed, engine_temp, observed_at, stored_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.vehicle_id,
                    record.latitude,
                    record.longitude,
                    record.speed,
                    record.engine_temp,
                    format_ts(record.observed_at),
                    stored_at,
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn latest(
        &self,
        vehicle_id: &str,
    ) -> Result<Option<StoredRecord>, ContractError> {
        let vehicle_id = vehicle_id.to_string();
        let row = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT vehicle_id, latitude, longitude, speed, engine_temp, observed_at, stored_at \
                     FROM vehicle_locations WHERE vehicle_id = ?1 \
                     ORDER BY observed_at DESC, id DESC LIMIT 1",
                    params![vehicle_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, f64>(1)?,
                            row.get::<_, f64>(2)?,
                            row.get::<_, f64>(3)?,
                            row.get::<_, f64>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, String>(6)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        let Some((vehicle_id, latitude, longitude, speed, engine_temp, observed_at, stored_at)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(StoredRecord {
            record: Record {
                vehicle_id,
                latitude,
                longitude,
                speed,
                engine_temp,
                observed_at: parse_ts(&observed_at)?,
            },
            stored_at: parse_ts(&stored_at)?,
        }))
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, ContractError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ContractError::store(KIND, format!("bad timestamp '{raw}': {e}")))
}

fn sql_error(err: rusqlite::Error) -> ContractError {
    ContractError::store(KIND, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(latitude: f64, second: u32) -> Record {
        Record {
            vehicle_id: "TRUCK-001".to_string(),
            latitude,
            longitude: -74.006,
            speed: 42.5,
            engine_temp: 195.0,
            observed_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, second).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_latest() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record(10.0, 1)).await.unwrap();
        store.insert(&record(10.1, 2)).await.unwrap();

        let latest = store.latest("TRUCK-001").await.unwrap().unwrap();
        assert_eq!(latest.record, record(10.1, 2));
        assert!(store.latest("TRUCK-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_tie_prefers_last_insert() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record(1.0, 0)).await.unwrap();
        store.insert(&record(2.0, 0)).await.unwrap();
        assert_eq!(
            store.latest("TRUCK-001").await.unwrap().unwrap().record.latitude,
            2.0
        );
    }

    #[tokio::test]
    async fn test_duplicates_kept() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record(1.0, 0)).await.unwrap();
        store.insert(&record(1.0, 0)).await.unwrap();
        assert_eq!(store.count("TRUCK-001").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(&record(5.0, 3)).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.latest("TRUCK-001").await.unwrap().unwrap().record.latitude,
            5.0
        );
    }
}
