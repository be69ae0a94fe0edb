//! SubscriberRegistry - the set of live broadcast targets
//!
//! One exclusive lock guards the map. It is taken for register, remove and
//! snapshot only and is never held across an await: handles are closed after
//! the entry has left the map.
//!
//! Closing a handle is bounded by the close timeout. A peer that stops reading
//! cannot hold up eviction or shutdown past it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{CloseReason, SubscriberConnection, SubscriberId, SubscriberState};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifetime counters of the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub active: usize,
    pub registered: u64,
    pub closed: u64,
    pub failed: u64,
}

pub struct SubscriberRegistry {
    entries: Mutex<HashMap<SubscriberId, Arc<dyn SubscriberConnection>>>,
    close_timeout: Duration,
    next_id: AtomicU64,
    registered: AtomicU64,
    closed: AtomicU64,
    failed: AtomicU64,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::with_close_timeout(DEFAULT_CLOSE_TIMEOUT)
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_close_timeout(close_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            close_timeout,
            next_id: AtomicU64::new(0),
            registered: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Upper bound on a single `close` call.
    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Add a connection; it is `Active` from here on.
    pub fn register(&self, connection: Arc<dyn SubscriberConnection>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let peer = connection.peer().to_string();
        let active = {
            let mut entries = self.entries.lock();
            entries.insert(id, connection);
            entries.len()
        };
        self.registered.fetch_add(1, Ordering::Relaxed);
        info!(subscriber = %id, peer = %peer, active, "subscriber registered");
        id
    }

    /// Take a subscriber out of the set.
    ///
    /// Returns the handle so the caller can close it outside the lock. Removing
    /// an id that is already gone is a no-op and returns `None`.
    pub fn remove(
        &self,
        id: SubscriberId,
        reason: CloseReason,
    ) -> Option<Arc<dyn SubscriberConnection>> {
        let (connection, active) = {
            let mut entries = self.entries.lock();
            let connection = entries.remove(&id)?;
            (connection, entries.len())
        };

        match reason.terminal_state() {
            SubscriberState::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            _ => self.closed.fetch_add(1, Ordering::Relaxed),
        };
        debug!(
            subscriber = %id,
            peer = %connection.peer(),
            reason = ?reason,
            active,
            "subscriber removed"
        );
        Some(connection)
    }

    /// Remove and close. Returns false if the subscriber was already gone.
    pub async fn evict(&self, id: SubscriberId, reason: CloseReason) -> bool {
        match self.remove(id, reason) {
            Some(connection) => {
                close_bounded(id, connection, self.close_timeout).await;
                true
            }
            None => false,
        }
    }

    /// Current members. Iteration order is unspecified.
    pub fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn SubscriberConnection>)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, conn)| (*id, Arc::clone(conn)))
            .collect()
    }

    /// `Active` while registered, `None` once removed.
    pub fn state(&self, id: SubscriberId) -> Option<SubscriberState> {
        self.entries
            .lock()
            .contains_key(&id)
            .then_some(SubscriberState::Active)
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and close every subscriber. Returns how many were closed.
    ///
    /// Handles are closed concurrently, so the whole call takes at most one
    /// close timeout.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();
        let mut closing = Vec::with_capacity(count);
        for (id, connection) in drained {
            match reason.terminal_state() {
                SubscriberState::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
                _ => self.closed.fetch_add(1, Ordering::Relaxed),
            };
            debug!(subscriber = %id, reason = ?reason, "closing subscriber");
            closing.push(tokio::spawn(close_bounded(id, connection, self.close_timeout)));
        }
        for handle in closing {
            let _ = handle.await;
        }
        if count > 0 {
            info!(count, reason = ?reason, "all subscribers closed");
        }
        count
    }

    pub fn stats(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            active: self.len(),
            registered: self.registered.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

async fn close_bounded(
    id: SubscriberId,
    connection: Arc<dyn SubscriberConnection>,
    limit: Duration,
) {
    if tokio::time::timeout(limit, connection.close()).await.is_err() {
        warn!(
            subscriber = %id,
            peer = %connection.peer(),
            timeout_ms = limit.as_millis() as u64,
            "subscriber close timed out, dropping handle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    #[test]
    fn test_register_and_remove() {
        let registry = SubscriberRegistry::new();
        let a = registry.register(MockConnection::new("a"));
        let b = registry.register(MockConnection::new("b"));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.state(a), Some(SubscriberState::Active));

        assert!(registry.remove(a, CloseReason::Graceful).is_some());
        assert_eq!(registry.state(a), None);
        assert!(registry.contains(b));
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let registry = SubscriberRegistry::new();
        let id = registry.register(MockConnection::new("a"));

        assert!(registry.remove(id, CloseReason::WriteFailed).is_some());
        assert!(registry.remove(id, CloseReason::Graceful).is_none());

        let stats = registry.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.closed, 0);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_evict_closes_handle() {
        let registry = SubscriberRegistry::new();
        let conn = MockConnection::new("a");
        let id = registry.register(conn.clone());

        assert!(registry.evict(id, CloseReason::WriteFailed).await);
        assert!(conn.is_closed());
        assert!(!registry.evict(id, CloseReason::WriteFailed).await);
        assert_eq!(conn.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = SubscriberRegistry::new();
        let conns: Vec<_> = (0..3)
            .map(|i| MockConnection::new(&format!("peer-{i}")))
            .collect();
        for conn in &conns {
            registry.register(conn.clone());
        }

        assert_eq!(registry.close_all(CloseReason::Shutdown).await, 3);
        assert!(registry.is_empty());
        assert!(conns.iter().all(|c| c.is_closed()));
        assert_eq!(registry.stats().closed, 3);
    }

    #[tokio::test]
    async fn test_hanging_close_is_bounded() {
        let registry = SubscriberRegistry::with_close_timeout(Duration::from_millis(50));
        let stuck = MockConnection::hanging_close("stuck");
        let id = registry.register(stuck.clone());

        let evicted = tokio::time::timeout(
            Duration::from_secs(2),
            registry.evict(id, CloseReason::WriteFailed),
        )
        .await
        .expect("evict waited on a close that never finishes");
        assert!(evicted);
        assert!(stuck.is_closed());
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_close_all_with_hanging_peers_takes_one_timeout() {
        let registry = SubscriberRegistry::with_close_timeout(Duration::from_millis(200));
        let stuck: Vec<_> = (0..5)
            .map(|i| MockConnection::hanging_close(&format!("stuck-{i}")))
            .collect();
        for conn in &stuck {
            registry.register(conn.clone());
        }
        let healthy = MockConnection::new("healthy");
        registry.register(healthy.clone());

        let started = std::time::Instant::now();
        assert_eq!(registry.close_all(CloseReason::Shutdown).await, 6);
        // sequential closes would need five timeouts
        assert!(started.elapsed() < Duration::from_millis(800));
        assert!(registry.is_empty());
        assert!(healthy.is_closed());
        assert!(stuck.iter().all(|c| c.is_closed()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutation() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut tasks = Vec::new();

        for worker in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let mut kept = Vec::new();
                for i in 0..200 {
                    let id = registry.register(MockConnection::new(&format!("w{worker}-{i}")));
                    if i % 2 == 0 {
                        registry.evict(id, CloseReason::Graceful).await;
                    } else {
                        kept.push(id);
                    }
                    // iterate while others mutate
                    for (sid, conn) in registry.snapshot() {
                        assert!(!conn.peer().is_empty());
                        assert!(sid.0 > 0);
                    }
                    tokio::task::yield_now().await;
                }
                kept
            }));
        }

        let mut kept = Vec::new();
        for task in tasks {
            kept.extend(task.await.unwrap());
        }

        assert_eq!(registry.len(), kept.len());
        assert!(kept.iter().all(|id| registry.contains(*id)));

        let stats = registry.stats();
        assert_eq!(stats.registered, 8 * 200);
        assert_eq!(stats.closed, 8 * 100);
        assert_eq!(stats.active, 8 * 100);
    }
}
