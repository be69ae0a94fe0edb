//! In-process partitioned broker
//!
//! Stands in for the external ordered log: messages are routed to a partition
//! by key hash, each partition is append-only, and every consumer group keeps
//! its own committed offsets. A fresh consumer resumes from the committed
//! position of its group, which is what makes redelivery observable.
//!
//! Without retention a partition keeps every message for the life of the
//! broker. A broker built with [`MemoryBroker::with_retention`] drops the
//! messages every known group has committed past. Offsets keep counting from
//! the partition's base, and a group created after a trim starts at that base.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use contracts::{ContractError, RecordStream, StreamMessage, StreamPosition, StreamPublisher};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

#[derive(Default)]
struct Partition {
    /// Offset of the first retained message
    base: u64,
    log: VecDeque<StreamMessage>,
}

impl Partition {
    fn next_offset(&self) -> u64 {
        self.base + self.log.len() as u64
    }

    fn get(&self, offset: u64) -> Option<&StreamMessage> {
        let index = offset.checked_sub(self.base)?;
        self.log.get(index as usize)
    }

    /// Drop everything below `offset`. Returns how many messages went.
    fn trim_to(&mut self, offset: u64) -> usize {
        let count = offset.saturating_sub(self.base).min(self.log.len() as u64) as usize;
        self.log.drain(..count);
        self.base += count as u64;
        count
    }
}

struct BrokerInner {
    partitions: Vec<Mutex<Partition>>,
    /// (group, partition) -> next offset to read
    committed: Mutex<HashMap<(String, u32), u64>>,
    retain_committed: bool,
    notify: Notify,
    closed: AtomicBool,
    fetch_faults: AtomicU32,
    publish_faults: AtomicU32,
}

/// Shared handle to the broker. Cheap to clone.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create a broker with `partitions` partitions (at least one).
    pub fn new(partitions: u32) -> Self {
        Self::build(partitions, false)
    }

    /// Like [`new`](Self::new), but a commit trims the partition below the
    /// lowest offset committed by any group that has created a consumer.
    pub fn with_retention(partitions: u32) -> Self {
        Self::build(partitions, true)
    }

    fn build(partitions: u32, retain_committed: bool) -> Self {
        let partitions = partitions.max(1);
        Self {
            inner: Arc::new(BrokerInner {
                partitions: (0..partitions).map(|_| Mutex::default()).collect(),
                committed: Mutex::new(HashMap::new()),
                retain_committed,
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                fetch_faults: AtomicU32::new(0),
                publish_faults: AtomicU32::new(0),
            }),
        }
    }

    /// Number of partitions
    pub fn partition_count(&self) -> u32 {
        self.inner.partitions.len() as u32
    }

    /// Partition a key is routed to
    pub fn partition_for(&self, key: &[u8]) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.partitions.len() as u64) as u32
    }

    /// Messages currently held across all partitions
    pub fn len(&self) -> usize {
        self.inner.partitions.iter().map(|p| p.lock().log.len()).sum()
    }

    /// Offset the next message appended to `partition` will get
    pub fn next_offset(&self, partition: u32) -> u64 {
        self.inner
            .partitions
            .get(partition as usize)
            .map(|p| p.lock().next_offset())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next offset `group` will read from `partition`
    pub fn committed_offset(&self, group: &str, partition: u32) -> u64 {
        self.inner
            .committed
            .lock()
            .get(&(group.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    /// Create a consumer that resumes from the committed offsets of `group`.
    pub fn consumer(&self, group: impl Into<String>) -> MemoryStream {
        let group = group.into();
        let positions = {
            let mut committed = self.inner.committed.lock();
            (0..self.partition_count())
                .map(|p| {
                    let key = (group.clone(), p);
                    if self.inner.retain_committed {
                        // known from now on, so trimming waits for this group
                        let base = self.inner.partitions[p as usize].lock().base;
                        *committed.entry(key).or_insert(base)
                    } else {
                        committed.get(&key).copied().unwrap_or(0)
                    }
                })
                .collect()
        };
        debug!(group = %group, "consumer created");
        MemoryStream {
            inner: Arc::clone(&self.inner),
            group,
            positions,
            next_partition: 0,
        }
    }

    /// Make the next `count` fetches fail with a transient error.
    pub fn inject_fetch_failures(&self, count: u32) {
        self.inner.fetch_faults.fetch_add(count, Ordering::SeqCst);
    }

    /// Make the next `count` publishes fail.
    pub fn inject_publish_failures(&self, count: u32) {
        self.inner.publish_faults.fetch_add(count, Ordering::SeqCst);
    }

    /// Close the broker. Consumers drain what is left, then see end of stream.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn append(&self, key: Bytes, value: Bytes) -> Result<StreamPosition, ContractError> {
        if self.is_closed() {
            return Err(ContractError::stream_publish("broker is closed"));
        }
        if take_fault(&self.inner.publish_faults) {
            return Err(ContractError::stream_publish("injected publish failure"));
        }

        let partition = self.partition_for(&key);
        let position = {
            let mut log = self.inner.partitions[partition as usize].lock();
            let position = StreamPosition {
                partition,
                offset: log.next_offset(),
            };
            log.log.push_back(StreamMessage {
                position,
                key,
                value,
            });
            position
        };

        trace!(partition, offset = position.offset, "message appended");
        self.inner.notify.notify_waiters();
        Ok(position)
    }
}

impl StreamPublisher for MemoryBroker {
    async fn publish(&self, key: Bytes, value: Bytes) -> Result<StreamPosition, ContractError> {
        self.append(key, value)
    }
}

fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Consumer of one group.
///
/// `fetch` is cancel safe: the read position only moves when a message is
/// returned.
pub struct MemoryStream {
    inner: Arc<BrokerInner>,
    group: String,
    /// Per-partition read position (not yet committed)
    positions: Vec<u64>,
    next_partition: usize,
}

impl MemoryStream {
    /// Consumer group name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Round-robin over partitions, preserving order inside each one.
    fn poll_next(&mut self) -> Option<StreamMessage> {
        let count = self.positions.len();
        for step in 0..count {
            let partition = (self.next_partition + step) % count;
            let log = self.inner.partitions[partition].lock();
            // a trim can race with this group's registration
            let position = self.positions[partition].max(log.base);
            if let Some(message) = log.get(position) {
                let message = message.clone();
                drop(log);
                self.positions[partition] = position + 1;
                self.next_partition = (partition + 1) % count;
                return Some(message);
            }
        }
        None
    }
}

impl RecordStream for MemoryStream {
    async fn fetch(&mut self) -> Result<Option<StreamMessage>, ContractError> {
        if take_fault(&self.inner.fetch_faults) {
            return Err(ContractError::stream_fetch("injected fetch failure"));
        }

        let inner = Arc::clone(&self.inner);
        loop {
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            // register before checking so a publish in between is not missed
            notified.as_mut().enable();

            if let Some(message) = self.poll_next() {
                return Ok(Some(message));
            }
            if inner.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            notified.await;
        }
    }

    async fn commit(&mut self, message: &StreamMessage) -> Result<(), ContractError> {
        let partition = message.position.partition;
        let key = (self.group.clone(), partition);
        let next = message.position.offset + 1;
        let low_watermark = {
            let mut committed = self.inner.committed.lock();
            let entry = committed.entry(key).or_insert(0);
            if next > *entry {
                *entry = next;
            }
            committed
                .iter()
                .filter(|((_, p), _)| *p == partition)
                .map(|(_, offset)| *offset)
                .min()
        };

        if self.inner.retain_committed {
            if let Some(offset) = low_watermark {
                let trimmed = self.inner.partitions[partition as usize].lock().trim_to(offset);
                if trimmed > 0 {
                    trace!(partition, trimmed, base = offset, "partition trimmed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn publish(broker: &MemoryBroker, key: &str, value: &str) -> StreamPosition {
        broker
            .publish(Bytes::from(key.to_string()), Bytes::from(value.to_string()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_same_key_same_partition_in_order() {
        let broker = MemoryBroker::new(4);
        let first = publish(&broker, "T1", "a").await;
        let second = publish(&broker, "T1", "b").await;
        assert_eq!(first.partition, second.partition);
        assert_eq!(second.offset, first.offset + 1);

        let mut stream = broker.consumer("g");
        let a = stream.fetch().await.unwrap().unwrap();
        let b = stream.fetch().await.unwrap().unwrap();
        assert_eq!(a.value, "a");
        assert_eq!(b.value, "b");
    }

    #[tokio::test]
    async fn test_new_consumer_resumes_from_commit() {
        let broker = MemoryBroker::new(1);
        publish(&broker, "T1", "a").await;
        publish(&broker, "T1", "b").await;

        let mut stream = broker.consumer("g");
        let a = stream.fetch().await.unwrap().unwrap();
        stream.commit(&a).await.unwrap();
        let _b = stream.fetch().await.unwrap().unwrap();
        drop(stream);

        // b was fetched but never committed
        let mut restarted = broker.consumer("g");
        let again = restarted.fetch().await.unwrap().unwrap();
        assert_eq!(again.value, "b");
        assert_eq!(broker.committed_offset("g", 0), 1);
    }

    #[tokio::test]
    async fn test_groups_are_independent() {
        let broker = MemoryBroker::new(1);
        publish(&broker, "T1", "a").await;

        let mut g1 = broker.consumer("g1");
        let msg = g1.fetch().await.unwrap().unwrap();
        g1.commit(&msg).await.unwrap();

        let mut g2 = broker.consumer("g2");
        assert_eq!(g2.fetch().await.unwrap().unwrap().value, "a");
    }

    #[tokio::test]
    async fn test_fetch_waits_for_publish() {
        let broker = MemoryBroker::new(2);
        let mut stream = broker.consumer("g");

        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publish(&producer, "T9", "late").await;
        });

        let msg = tokio::time::timeout(Duration::from_secs(2), stream.fetch())
            .await
            .expect("fetch should wake on publish")
            .unwrap()
            .unwrap();
        assert_eq!(msg.value, "late");
    }

    #[tokio::test]
    async fn test_close_ends_stream_after_drain() {
        let broker = MemoryBroker::new(1);
        publish(&broker, "T1", "a").await;
        broker.close();

        let mut stream = broker.consumer("g");
        assert!(stream.fetch().await.unwrap().is_some());
        assert!(stream.fetch().await.unwrap().is_none());
        assert!(broker
            .publish(Bytes::from_static(b"T1"), Bytes::from_static(b"x"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let broker = MemoryBroker::new(1);
        broker.inject_publish_failures(1);
        assert!(broker
            .publish(Bytes::from_static(b"T1"), Bytes::from_static(b"x"))
            .await
            .is_err());
        publish(&broker, "T1", "y").await;

        broker.inject_fetch_failures(2);
        let mut stream = broker.consumer("g");
        assert!(stream.fetch().await.unwrap_err().is_transient());
        assert!(stream.fetch().await.is_err());
        assert_eq!(stream.fetch().await.unwrap().unwrap().value, "y");
    }

    #[tokio::test]
    async fn test_retention_trims_what_every_group_committed() {
        let broker = MemoryBroker::with_retention(1);
        let mut fast = broker.consumer("fast");
        let mut slow = broker.consumer("slow");
        for value in ["a", "b", "c"] {
            publish(&broker, "T1", value).await;
        }

        for _ in 0..3 {
            let msg = fast.fetch().await.unwrap().unwrap();
            fast.commit(&msg).await.unwrap();
        }
        // slow has committed nothing yet
        assert_eq!(broker.len(), 3);

        let a = slow.fetch().await.unwrap().unwrap();
        slow.commit(&a).await.unwrap();
        assert_eq!(broker.len(), 2);

        // offsets keep counting past the trimmed prefix
        let d = publish(&broker, "T1", "d").await;
        assert_eq!(d.offset, 3);
        assert_eq!(broker.next_offset(0), 4);
        assert_eq!(fast.fetch().await.unwrap().unwrap().value, "d");
        assert_eq!(slow.fetch().await.unwrap().unwrap().value, "b");

        // a restarted consumer resumes from its commit, not from the trim point
        drop(slow);
        let mut slow = broker.consumer("slow");
        assert_eq!(slow.fetch().await.unwrap().unwrap().value, "b");
    }

    #[tokio::test]
    async fn test_retention_late_group_starts_at_base() {
        let broker = MemoryBroker::with_retention(1);
        let mut only = broker.consumer("only");
        publish(&broker, "T1", "a").await;
        publish(&broker, "T1", "b").await;
        let a = only.fetch().await.unwrap().unwrap();
        only.commit(&a).await.unwrap();
        assert_eq!(broker.len(), 1);

        let mut late = broker.consumer("late");
        assert_eq!(broker.committed_offset("late", 0), 1);
        let b = late.fetch().await.unwrap().unwrap();
        assert_eq!(b.position.offset, 1);
        assert_eq!(b.value, "b");
    }

    #[tokio::test]
    async fn test_without_retention_everything_stays() {
        let broker = MemoryBroker::new(1);
        let mut stream = broker.consumer("g");
        publish(&broker, "T1", "a").await;
        let a = stream.fetch().await.unwrap().unwrap();
        stream.commit(&a).await.unwrap();
        assert_eq!(broker.len(), 1);
        let mut other = broker.consumer("other");
        assert_eq!(other.fetch().await.unwrap().unwrap().value, "a");
    }
}
