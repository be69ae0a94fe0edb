//! Test doubles shared by the module tests

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use contracts::{ContractError, Record, SubscriberConnection};
use parking_lot::Mutex;

pub fn record(vehicle_id: &str, seq: u32) -> Record {
    Record {
        vehicle_id: vehicle_id.to_string(),
        latitude: 10.0 + seq as f64 / 10.0,
        longitude: 20.0 + seq as f64 / 10.0,
        speed: 50.0,
        engine_temp: 190.0,
        observed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::seconds(seq as i64),
    }
}

/// Connection that records pushes and can be told to fail or stall.
///
/// Like a socket, it refuses pushes once closed. The `pushed` lock orders a
/// push against a concurrent close.
#[derive(Default)]
pub struct MockConnection {
    pub peer: String,
    pub pushed: Mutex<Vec<Bytes>>,
    pub fail: AtomicBool,
    pub stall: Option<Duration>,
    pub hang_on_close: bool,
    pub closes: AtomicU32,
}

impl MockConnection {
    pub fn new(peer: &str) -> Arc<Self> {
        Arc::new(Self {
            peer: peer.to_string(),
            ..Default::default()
        })
    }

    pub fn failing(peer: &str) -> Arc<Self> {
        let conn = Self::new(peer);
        conn.fail.store(true, Ordering::SeqCst);
        conn
    }

    pub fn stalled(peer: &str, stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            peer: peer.to_string(),
            stall: Some(stall),
            ..Default::default()
        })
    }

    /// Marks itself closed, then never finishes closing.
    pub fn hanging_close(peer: &str) -> Arc<Self> {
        Arc::new(Self {
            peer: peer.to_string(),
            hang_on_close: true,
            ..Default::default()
        })
    }

    pub fn pushed(&self) -> usize {
        self.pushed.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl SubscriberConnection for MockConnection {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn push(&self, payload: Bytes) -> Result<(), ContractError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ContractError::subscriber_write(&self.peer, "mock failure"));
        }
        let mut pushed = self.pushed.lock();
        if self.is_closed() {
            return Err(ContractError::subscriber_write(&self.peer, "connection closed"));
        }
        pushed.push(payload);
        Ok(())
    }

    async fn close(&self) {
        {
            let _pushes = self.pushed.lock();
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
    }
}
