//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 端到端数据流：Ingestor → MemoryBroker → StreamReader → Dispatcher → Store / 订阅者
//! - 故障场景：解码失败、存储失败（死信）、订阅者失败、重投递

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_default_blueprint_validates() {
        let blueprint = contracts::PipelineBlueprint::default();
        assert!(config_loader::ConfigLoader::validate(&blueprint).is_ok());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use contracts::{
        ContractError, DeadLetter, PipelineBlueprint, Record, RecordStore, StoredRecord,
        StreamPublisher, SubscriberConnection,
    };
    use dispatcher::{
        BroadcastSink, DispatcherBuilder, DispatcherReport, PersistenceSink, SubscriberRegistry,
    };
    use ingestion::{Ingestor, MemoryBroker, ReaderConfig, ReaderSnapshot, StreamReader};
    use parking_lot::Mutex;
    use store::{FileDeadLetter, MemoryDeadLetter, MemoryStore, SqliteStore};
    use tokio_util::sync::CancellationToken;

    const STEP_TIMEOUT: Duration = Duration::from_secs(10);

    fn record(vehicle_id: &str, second: u32) -> Record {
        Record {
            vehicle_id: vehicle_id.to_string(),
            latitude: 40.7128 + second as f64 * 0.0001,
            longitude: -74.006,
            speed: 30.0 + second as f64,
            engine_temp: 190.0,
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
        }
    }

    /// 记录收到的每条推送的订阅者
    struct CollectingConnection {
        peer: String,
        payloads: Mutex<Vec<Bytes>>,
        delay: Option<Duration>,
        fail: bool,
        closed: AtomicBool,
    }

    impl CollectingConnection {
        fn new(peer: &str) -> Arc<Self> {
            Arc::new(Self::base(peer))
        }

        fn slow(peer: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay: Some(delay),
                ..Self::base(peer)
            })
        }

        fn failing(peer: &str) -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::base(peer)
            })
        }

        fn base(peer: &str) -> Self {
            Self {
                peer: peer.to_string(),
                payloads: Mutex::new(Vec::new()),
                delay: None,
                fail: false,
                closed: AtomicBool::new(false),
            }
        }

        fn records(&self) -> Vec<Record> {
            self.payloads
                .lock()
                .iter()
                .map(|p| serde_json::from_slice(p).unwrap())
                .collect()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SubscriberConnection for CollectingConnection {
        fn peer(&self) -> &str {
            &self.peer
        }

        async fn push(&self, payload: Bytes) -> Result<(), ContractError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ContractError::subscriber_write(&self.peer, "broken pipe"));
            }
            self.payloads.lock().push(payload);
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// 永远失败的存储
    struct DownStore;

    impl RecordStore for DownStore {
        fn kind(&self) -> &'static str {
            "down"
        }

        async fn insert(&self, _record: &Record) -> Result<(), ContractError> {
            Err(ContractError::store("down", "connection refused"))
        }

        async fn latest(&self, _vehicle_id: &str) -> Result<Option<StoredRecord>, ContractError> {
            Ok(None)
        }
    }

    fn fast_blueprint() -> PipelineBlueprint {
        let mut blueprint = PipelineBlueprint::default();
        blueprint.persistence.retry_backoff.initial_ms = 1;
        blueprint.persistence.retry_backoff.max_ms = 5;
        blueprint
    }

    /// 运行 reader + dispatcher 直到 broker 关闭且所有队列排空
    async fn run_to_end<S, D>(
        broker: &MemoryBroker,
        blueprint: &PipelineBlueprint,
        store: Arc<S>,
        dead_letter: Option<Arc<D>>,
        registry: Arc<SubscriberRegistry>,
    ) -> (ReaderSnapshot, DispatcherReport)
    where
        S: RecordStore + Send + Sync + 'static,
        D: DeadLetter + Send + Sync + 'static,
    {
        let (tx, rx) = async_channel::bounded(blueprint.distributor.input_capacity);
        let (signal, readiness) = ingestion::readiness();

        let dispatcher = DispatcherBuilder::new(blueprint.distributor.clone(), rx).build(
            PersistenceSink::new(store, dead_letter, &blueprint.persistence),
            BroadcastSink::new(registry, &blueprint.broadcast),
        );
        let dispatcher = dispatcher.spawn(move || signal.mark_ready());

        let reader = StreamReader::new(
            broker.consumer(blueprint.stream.group_id.clone()),
            ReaderConfig::from(&blueprint.stream),
        );
        let snapshot = tokio::time::timeout(
            STEP_TIMEOUT,
            reader.run(tx, readiness, CancellationToken::new()),
        )
        .await
        .expect("reader timed out")
        .expect("reader failed");

        let report = tokio::time::timeout(STEP_TIMEOUT, dispatcher)
            .await
            .expect("dispatcher timed out")
            .expect("dispatcher panicked")
            .expect("dispatcher failed");

        (snapshot, report)
    }

    async fn ingest_all(broker: &MemoryBroker, records: Vec<Record>) {
        let ingestor = Ingestor::new(broker.clone());
        for record in records {
            assert!(ingestor.ingest(record).await.success);
        }
    }

    /// 同一车辆的两条记录按序落库并按序广播，查询返回后一条
    #[tokio::test]
    async fn test_e2e_ordering_and_latest() {
        let blueprint = fast_blueprint();
        let broker = MemoryBroker::new(blueprint.stream.partitions);
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SubscriberRegistry::new());
        let subscriber = CollectingConnection::new("dash-1");
        registry.register(subscriber.clone());

        ingest_all(&broker, vec![record("TRUCK-001", 1), record("TRUCK-001", 2)]).await;
        broker.close();

        let (reader, report) = run_to_end(
            &broker,
            &blueprint,
            Arc::clone(&store),
            None::<Arc<MemoryDeadLetter>>,
            registry,
        )
        .await;

        assert_eq!(reader.handed_off, 2);
        assert_eq!(reader.committed, 2);
        assert_eq!(report.distributor.received, 2);
        assert_eq!(report.sink("persistence").unwrap().write_count, 2);

        let rows = store.rows_for("TRUCK-001");
        assert_eq!(rows.len(), 2);
        assert!(rows[0].record.observed_at < rows[1].record.observed_at);

        let latest = store.latest("TRUCK-001").await.unwrap().unwrap();
        assert_eq!(latest.record, record("TRUCK-001", 2));

        let pushed = subscriber.records();
        assert_eq!(pushed, vec![record("TRUCK-001", 1), record("TRUCK-001", 2)]);
        // shutdown closes every remaining subscriber
        assert!(subscriber.is_closed());
    }

    /// 广播队列满时丢弃广播，但持久化一条不少
    #[tokio::test]
    async fn test_e2e_slow_subscriber_never_costs_persistence() {
        let mut blueprint = fast_blueprint();
        blueprint.distributor.broadcast_queue_capacity = 1;
        blueprint.broadcast.push_timeout_ms = 1_000;

        let broker = MemoryBroker::new(blueprint.stream.partitions);
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SubscriberRegistry::new());
        let slow = CollectingConnection::slow("slow", Duration::from_millis(20));
        registry.register(slow.clone());

        let records: Vec<Record> = (0..40).map(|i| record("TRUCK-002", i % 60)).collect();
        ingest_all(&broker, records).await;
        broker.close();

        let (_, report) = run_to_end(
            &broker,
            &blueprint,
            Arc::clone(&store),
            None::<Arc<MemoryDeadLetter>>,
            registry,
        )
        .await;

        assert_eq!(store.len(), 40);
        let dropped = report.distributor.broadcast_dropped;
        assert!(dropped > 0, "slow subscriber should have caused drops");
        assert_eq!(slow.records().len() as u64 + dropped, 40);
        assert_eq!(
            report.sink("broadcast").unwrap().dropped_count,
            dropped
        );
    }

    /// 推送失败的订阅者被移除，其他订阅者不受影响
    #[tokio::test]
    async fn test_e2e_failed_subscriber_is_evicted() {
        let blueprint = fast_blueprint();
        let broker = MemoryBroker::new(blueprint.stream.partitions);
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SubscriberRegistry::new());

        let healthy = CollectingConnection::new("healthy");
        let broken = CollectingConnection::failing("broken");
        registry.register(healthy.clone());
        let broken_id = registry.register(broken.clone());

        ingest_all(&broker, (0..5).map(|i| record("TRUCK-003", i)).collect()).await;
        broker.close();

        run_to_end(
            &broker,
            &blueprint,
            store,
            None::<Arc<MemoryDeadLetter>>,
            Arc::clone(&registry),
        )
        .await;

        assert_eq!(healthy.records().len(), 5);
        assert!(broken.records().is_empty());
        assert!(broken.is_closed());
        assert!(!registry.contains(broken_id));

        let stats = registry.stats();
        assert_eq!(stats.registered, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.closed, 1);
    }

    /// 无法解码的消息被跳过并提交，前后记录照常处理
    #[tokio::test]
    async fn test_e2e_decode_failure_is_skipped() {
        let blueprint = fast_blueprint();
        let broker = MemoryBroker::new(1);
        let store = Arc::new(MemoryStore::new());

        ingest_all(&broker, vec![record("TRUCK-004", 1)]).await;
        broker
            .publish(Bytes::from_static(b"TRUCK-004"), Bytes::from_static(b"\x00\x01"))
            .await
            .unwrap();
        ingest_all(&broker, vec![record("TRUCK-004", 2)]).await;
        broker.close();

        let (reader, _) = run_to_end(
            &broker,
            &blueprint,
            Arc::clone(&store),
            None::<Arc<MemoryDeadLetter>>,
            Arc::new(SubscriberRegistry::new()),
        )
        .await;

        assert_eq!(reader.fetched, 3);
        assert_eq!(reader.decode_errors, 1);
        assert_eq!(reader.handed_off, 2);
        assert_eq!(reader.committed, 3);
        assert_eq!(store.len(), 2);
        assert_eq!(broker.committed_offset(&blueprint.stream.group_id, 0), 3);
    }

    /// 已取出但未提交的消息在新消费者上重投递，重复写入被保留
    #[tokio::test]
    async fn test_e2e_uncommitted_message_is_redelivered() {
        use contracts::RecordStream;

        let blueprint = fast_blueprint();
        let broker = MemoryBroker::new(1);
        let store = Arc::new(MemoryStore::new());
        ingest_all(&broker, vec![record("TRUCK-005", 1)]).await;

        // a consumer that crashed after handing the record off, before commit
        {
            let mut crashed = broker.consumer(blueprint.stream.group_id.clone());
            let message = crashed.fetch().await.unwrap().unwrap();
            let decoded = ingestion::codec::decode_message(&message).unwrap();
            store.insert(&decoded).await.unwrap();
        }
        broker.close();

        let (reader, _) = run_to_end(
            &broker,
            &blueprint,
            Arc::clone(&store),
            None::<Arc<MemoryDeadLetter>>,
            Arc::new(SubscriberRegistry::new()),
        )
        .await;

        assert_eq!(reader.handed_off, 1);
        // at-least-once: the duplicate row is kept
        assert_eq!(store.rows_for("TRUCK-005").len(), 2);
        assert_eq!(broker.committed_offset(&blueprint.stream.group_id, 0), 1);
    }

    /// 重试耗尽的记录进入死信文件，reader 仍然前进
    #[tokio::test]
    async fn test_e2e_store_outage_goes_to_dead_letter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead").join("letters.jsonl");

        let mut blueprint = fast_blueprint();
        blueprint.persistence.max_attempts = 3;
        let broker = MemoryBroker::new(1);
        let dead_letter = Arc::new(FileDeadLetter::open(&path).unwrap());

        ingest_all(&broker, vec![record("TRUCK-006", 1), record("TRUCK-006", 2)]).await;
        broker.close();

        let (reader, report) = run_to_end(
            &broker,
            &blueprint,
            Arc::new(DownStore),
            Some(dead_letter),
            Arc::new(SubscriberRegistry::new()),
        )
        .await;

        assert_eq!(reader.committed, 2);
        let persistence = report.sink("persistence").unwrap();
        assert_eq!(persistence.write_count, 0);
        assert_eq!(persistence.retry_count, 4);
        assert_eq!(persistence.dead_letter_count, 2);

        let entries = FileDeadLetter::read_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record, record("TRUCK-006", 1));
        assert!(entries[0].reason.contains("connection refused"));
    }

    /// SQLite 后端：落库后重新打开文件仍可查询
    #[tokio::test]
    async fn test_e2e_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("telemetry.db");

        let blueprint = fast_blueprint();
        let broker = MemoryBroker::new(blueprint.stream.partitions);
        ingest_all(
            &broker,
            vec![
                record("TRUCK-007", 1),
                record("TRUCK-008", 1),
                record("TRUCK-007", 3),
            ],
        )
        .await;
        broker.close();

        let store = Arc::new(SqliteStore::open(&db).unwrap());
        run_to_end(
            &broker,
            &blueprint,
            store,
            None::<Arc<MemoryDeadLetter>>,
            Arc::new(SubscriberRegistry::new()),
        )
        .await;

        let reopened = SqliteStore::open(&db).unwrap();
        assert_eq!(reopened.count("TRUCK-007").await.unwrap(), 2);
        let latest = reopened.latest("TRUCK-007").await.unwrap().unwrap();
        assert_eq!(latest.record, record("TRUCK-007", 3));
        assert!(reopened.latest("TRUCK-404").await.unwrap().is_none());
    }

    /// 从 TOML 配置构建的管道可以端到端运行
    #[tokio::test]
    async fn test_e2e_from_toml_config() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
            [stream]
            partitions = 2
            group_id = "e2e"

            [distributor]
            input_capacity = 4
            persistence_queue_capacity = 2
            broadcast_queue_capacity = 2
            "#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let broker = MemoryBroker::new(blueprint.stream.partitions);
        let store = Arc::new(MemoryStore::new());
        ingest_all(&broker, (0..20).map(|i| record("TRUCK-009", i)).collect()).await;
        broker.close();

        let (reader, report) = run_to_end(
            &broker,
            &blueprint,
            Arc::clone(&store),
            None::<Arc<MemoryDeadLetter>>,
            Arc::new(SubscriberRegistry::new()),
        )
        .await;

        assert_eq!(reader.committed, 20);
        assert_eq!(report.distributor.delivered, 20);
        assert_eq!(store.len(), 20);
        assert_eq!(broker.committed_offset("e2e", 0) + broker.committed_offset("e2e", 1), 20);
    }
}
