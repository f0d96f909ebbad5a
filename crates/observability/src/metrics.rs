//! 通知分发指标收集模块
//!
//! 通过 `metrics` facade 记录分发器运行指标，并在内存中聚合消费端统计。
//! 未安装 recorder 时所有记录调用都是空操作。

use std::collections::HashMap;

use contracts::Condition;
use metrics::{counter, gauge};

/// 记录一次成功投递 (条件通道原本为空)
pub fn record_notification_delivered(topic: &str) {
    counter!(
        "notifycond_notifications_delivered_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// 记录一次合并 (条件通道已有待读值，新值被丢弃)
pub fn record_notification_coalesced(topic: &str) {
    counter!(
        "notifycond_notifications_coalesced_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// 记录未注册 topic 上的通知
pub fn record_notification_unroutable() {
    counter!("notifycond_notifications_unroutable_total").increment(1);
}

/// 记录一次 resync 广播
///
/// `channels` 为广播时已注册的条件通道数量。
pub fn record_resync_broadcast(channels: usize) {
    counter!("notifycond_resync_broadcasts_total").increment(1);
    gauge!("notifycond_resync_last_fanout").set(channels as f64);
}

/// 记录 keepalive 计时器触发
pub fn record_keepalive_fired() {
    counter!("notifycond_keepalive_fired_total").increment(1);
}

/// 记录探活结果
pub fn record_probe_result(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "notifycond_probes_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录当前已注册的 topic 数量
pub fn record_registered_topics(count: usize) {
    gauge!("notifycond_registered_topics").set(count as f64);
}

/// 消费端统计聚合器
///
/// 在内存中聚合每个 topic 读到的条件，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ConsumerStatsAggregator {
    /// 读到的条件总数
    pub total_wakeups: u64,

    /// 其中 resync 标记的数量
    pub total_resyncs: u64,

    /// 各 topic 读到的条件数
    pub wakeups_per_topic: HashMap<String, u64>,

    /// 两次唤醒之间的间隔 (毫秒)
    pub interval_stats: RunningStats,

    /// 通知负载长度 (字节)
    pub payload_stats: RunningStats,
}

impl ConsumerStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次唤醒
    ///
    /// `since_last_ms` 为同一 topic 上一次唤醒至今的时间，首次唤醒传 `None`。
    pub fn update(&mut self, topic: &str, condition: &Condition, since_last_ms: Option<f64>) {
        self.total_wakeups += 1;
        *self.wakeups_per_topic.entry(topic.to_string()).or_insert(0) += 1;

        match condition {
            Condition::Notify(n) => self.payload_stats.push(n.payload.len() as f64),
            Condition::Resync => self.total_resyncs += 1,
        }

        if let Some(ms) = since_last_ms {
            self.interval_stats.push(ms);
        }
    }

    /// 合并另一个聚合器 (每个消费任务各自统计，结束时合并)
    pub fn merge(&mut self, other: &ConsumerStatsAggregator) {
        self.total_wakeups += other.total_wakeups;
        self.total_resyncs += other.total_resyncs;
        for (topic, count) in &other.wakeups_per_topic {
            *self.wakeups_per_topic.entry(topic.clone()).or_insert(0) += count;
        }
        self.interval_stats.merge(&other.interval_stats);
        self.payload_stats.merge(&other.payload_stats);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> ConsumerSummary {
        ConsumerSummary {
            total_wakeups: self.total_wakeups,
            total_resyncs: self.total_resyncs,
            resync_rate: if self.total_wakeups > 0 {
                self.total_resyncs as f64 / self.total_wakeups as f64 * 100.0
            } else {
                0.0
            },
            wake_interval_ms: StatsSummary::from(&self.interval_stats),
            payload_bytes: StatsSummary::from(&self.payload_stats),
            wakeups_per_topic: self.wakeups_per_topic.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 消费端摘要
#[derive(Debug, Clone, Default)]
pub struct ConsumerSummary {
    pub total_wakeups: u64,
    pub total_resyncs: u64,
    pub resync_rate: f64,
    pub wake_interval_ms: StatsSummary,
    pub payload_bytes: StatsSummary,
    pub wakeups_per_topic: HashMap<String, u64>,
}

impl std::fmt::Display for ConsumerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Consumer Summary ===")?;
        writeln!(f, "Total wakeups: {}", self.total_wakeups)?;
        writeln!(
            f,
            "Resync wakeups: {} ({:.2}%)",
            self.total_resyncs, self.resync_rate
        )?;
        writeln!(f, "Wake interval (ms): {}", self.wake_interval_ms)?;
        writeln!(f, "Payload bytes: {}", self.payload_bytes)?;

        if !self.wakeups_per_topic.is_empty() {
            writeln!(f, "Wakeups per topic:")?;
            let mut topics: Vec<_> = self.wakeups_per_topic.iter().collect();
            topics.sort();
            for (topic, count) in topics {
                writeln!(f, "  {}: {}", topic, count)?;
            }
        }

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
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
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

    /// 合并另一组样本 (Chan 并行算法)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.mean += delta * other.count as f64 / count as f64;
        self.m2 += other.m2 + delta * delta * (self.count * other.count) as f64 / count as f64;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = count;
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

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
