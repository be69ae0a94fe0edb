//! 管道指标收集模块
//!
//! 所有指标以 `telemetry_fanout_` 为前缀。计数类指标由进程内原子计数器周期性
//! 同步（`absolute`），采样类指标在内存中聚合，便于退出时输出摘要。

use metrics::{counter, gauge, histogram};

/// 记录一次摄入请求
pub fn record_ingest(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("telemetry_fanout_ingest_total", "status" => status).increment(1);
}

/// 记录一次最新位置查询
pub fn record_query(found: bool) {
    let result = if found { "found" } else { "not_found" };
    counter!("telemetry_fanout_queries_total", "result" => result).increment(1);
}

/// Reader 累计计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderTotals {
    pub fetched: u64,
    pub handed_off: u64,
    pub decode_errors: u64,
    pub fetch_errors: u64,
    pub committed: u64,
}

/// 同步 Reader 计数
pub fn record_reader_totals(totals: &ReaderTotals) {
    counter!("telemetry_fanout_records_fetched_total").absolute(totals.fetched);
    counter!("telemetry_fanout_records_handed_off_total").absolute(totals.handed_off);
    counter!("telemetry_fanout_decode_errors_total").absolute(totals.decode_errors);
    counter!("telemetry_fanout_fetch_errors_total").absolute(totals.fetch_errors);
    counter!("telemetry_fanout_commits_total").absolute(totals.committed);
}

/// 单个 sink 的累计计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkTotals {
    pub queue_len: usize,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

/// 同步 sink 计数与队列深度
pub fn record_sink_totals(sink: &str, totals: &SinkTotals) {
    let sink = sink.to_string();
    gauge!("telemetry_fanout_queue_depth", "sink" => sink.clone()).set(totals.queue_len as f64);
    histogram!("telemetry_fanout_queue_depth_hist", "sink" => sink.clone())
        .record(totals.queue_len as f64);
    counter!("telemetry_fanout_sink_writes_total", "sink" => sink.clone(), "status" => "success")
        .absolute(totals.written);
    counter!("telemetry_fanout_sink_writes_total", "sink" => sink.clone(), "status" => "failure")
        .absolute(totals.failed);
    counter!("telemetry_fanout_records_dropped_total", "sink" => sink.clone())
        .absolute(totals.dropped);
    counter!("telemetry_fanout_store_retries_total", "sink" => sink.clone())
        .absolute(totals.retried);
    counter!("telemetry_fanout_dead_letters_total", "sink" => sink).absolute(totals.dead_lettered);
}

/// 当前在线订阅者数
pub fn record_subscribers(active: usize) {
    gauge!("telemetry_fanout_subscribers").set(active as f64);
}

/// 一次周期采样
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSample {
    pub persistence_queue: usize,
    pub broadcast_queue: usize,
    pub subscribers: usize,
}

/// 采样聚合器
///
/// 在内存中聚合队列深度与订阅者数，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct PipelineSampleAggregator {
    /// 采样次数
    pub samples: u64,

    /// 持久化队列深度
    pub persistence_depth: RunningStats,

    /// 广播队列深度
    pub broadcast_depth: RunningStats,

    /// 订阅者数
    pub subscribers: RunningStats,
}

impl PipelineSampleAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, sample: &PipelineSample) {
        self.samples += 1;
        self.persistence_depth.push(sample.persistence_queue as f64);
        self.broadcast_depth.push(sample.broadcast_queue as f64);
        self.subscribers.push(sample.subscribers as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            samples: self.samples,
            persistence_depth: StatsSummary::from(&self.persistence_depth),
            broadcast_depth: StatsSummary::from(&self.broadcast_depth),
            subscribers: StatsSummary::from(&self.subscribers),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub samples: u64,
    pub persistence_depth: StatsSummary,
    pub broadcast_depth: StatsSummary,
    pub subscribers: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Samples ===")?;
        writeln!(f, "Samples: {}", self.samples)?;
        writeln!(f, "Persistence queue depth: {}", self.persistence_depth)?;
        writeln!(f, "Broadcast queue depth: {}", self.broadcast_depth)?;
        writeln!(f, "Subscribers: {}", self.subscribers)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
