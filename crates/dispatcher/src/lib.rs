//! # Dispatcher
//!
//! 数据分发模块。
//!
//! 负责：
//! - 消费 Reader 交付的 `Record`
//! - Fan-out 到持久化 sink（阻塞、有界）与广播 sink（满则丢弃）
//! - 维护线程安全的订阅者注册表，写失败只移除失败的订阅者
//! - 隔离慢 sink，不阻塞主链路
//!
//! ## 使用示例
//!
//! ```ignore
//! let registry = Arc::new(SubscriberRegistry::new());
//! let persistence = PersistenceSink::new(store, dead_letter, &blueprint.persistence);
//! let broadcast = BroadcastSink::new(Arc::clone(&registry), &blueprint.broadcast);
//!
//! let dispatcher = DispatcherBuilder::new(blueprint.distributor.clone(), input_rx)
//!     .build(persistence, broadcast);
//! let task = dispatcher.spawn(move || ready_signal.mark_ready());
//! ```

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod registry;
pub mod sinks;

#[cfg(test)]
mod testing;

pub use contracts::{DataSink, Record};
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherReport, Distributor, SubmitOutcome};
pub use error::DispatcherError;
pub use handle::{QueuePolicy, SendOutcome, SinkHandle};
pub use metrics::{DistributorMetrics, DistributorSnapshot, MetricsSnapshot, SinkMetrics};
pub use registry::{RegistrySnapshot, SubscriberRegistry};
pub use sinks::{BroadcastSink, PersistenceSink};
