//! MemoryStore - rows kept in insertion order

use chrono::Utc;
use contracts::{ContractError, Record, RecordStore, StoredRecord};
use parking_lot::Mutex;

/// In-process store. Rows are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows in insertion order
    pub fn rows(&self) -> Vec<StoredRecord> {
        self.rows.lock().clone()
    }

    /// Rows of one vehicle in insertion order
    pub fn rows_for(&self, vehicle_id: &str) -> Vec<StoredRecord> {
        self.rows
            .lock()
            .iter()
            .filter(|row| row.record.vehicle_id == vehicle_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, record: &Record) -> Result<(), ContractError> {
        self.rows.lock().push(StoredRecord {
            record: record.clone(),
            stored_at: Utc::now(),
        });
        Ok(())
    }

    async fn latest(&self, vehicle_id: &str) -> Result<Option<StoredRecord>, ContractError> {
        // max_by_key keeps the last of equal maxima, i.e. the latest insert
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|row| row.record.vehicle_id == vehicle_id)
            .max_by_key(|row| row.record.observed_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(vehicle_id: &str, latitude: f64, second: u32) -> Record {
        Record {
            vehicle_id: vehicle_id.to_string(),
            latitude,
            longitude: 20.0,
            speed: 0.0,
            engine_temp: 0.0,
            observed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_latest_by_observed_at() {
        let store = MemoryStore::new();
        store.insert(&record("T1", 10.1, 5)).await.unwrap();
        store.insert(&record("T1", 10.0, 1)).await.unwrap();
        store.insert(&record("T2", 99.0, 9)).await.unwrap();

        let latest = store.latest("T1").await.unwrap().unwrap();
        assert_eq!(latest.record.latitude, 10.1);
        assert!(store.latest("T3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_tie_prefers_last_insert() {
        let store = MemoryStore::new();
        store.insert(&record("T1", 1.0, 0)).await.unwrap();
        store.insert(&record("T1", 2.0, 0)).await.unwrap();
        assert_eq!(store.latest("T1").await.unwrap().unwrap().record.latitude, 2.0);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let store = MemoryStore::new();
        let r = record("T1", 1.0, 0);
        store.insert(&r).await.unwrap();
        store.insert(&r).await.unwrap();
        assert_eq!(store.rows_for("T1").len(), 2);
        assert!(store.rows()[1].stored_at - store.rows()[0].stored_at >= Duration::zero());
    }
}
