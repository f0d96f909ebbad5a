//! 脚本化通知流
//!
//! 以固定频率在一组 topic 上生成通知，可周期性插入 resync，
//! 用于无数据库环境下的演示与压测。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::NotifyCondConfig;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::source::MockSourceHandle;

/// 通知流配置
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// (topic, 权重) 列表，按权重轮转
    pub topics: Vec<(String, u32)>,
    /// 每秒生成的通知数 (所有 topic 合计)
    pub rate_hz: f64,
    /// resync 周期 (None = 从不)
    pub resync_every: Option<Duration>,
}

impl FeedConfig {
    /// 从完整配置构建
    pub fn from_config(config: &NotifyCondConfig) -> Self {
        Self {
            topics: config
                .topics
                .iter()
                .map(|t| (t.name.clone(), t.weight))
                .collect(),
            rate_hz: config.source.rate_hz,
            resync_every: config.source.resync_every_ms.map(Duration::from_millis),
        }
    }

    /// 两次通知之间的间隔
    ///
    /// 频率非有限、非正，或换算后为零/溢出时返回 `None`。
    fn period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(1.0 / self.rate_hz)
            .ok()
            .filter(|period| !period.is_zero())
    }

    /// 按权重展开的发送顺序
    fn schedule(&self) -> Vec<String> {
        self.topics
            .iter()
            .flat_map(|(topic, weight)| std::iter::repeat_n(topic.clone(), *weight as usize))
            .collect()
    }
}

/// 脚本化通知流
///
/// 在后台任务中向 mock 源注入事件，直到 `stop()` 或事件流结束。
pub struct ScriptedFeed {
    running: Arc<AtomicBool>,
    sent: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl ScriptedFeed {
    /// 启动通知流
    pub fn start(source: MockSourceHandle, config: FeedConfig) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let sent = Arc::new(AtomicU64::new(0));

        let task_running = Arc::clone(&running);
        let task_sent = Arc::clone(&sent);
        let handle = tokio::spawn(async move {
            run_feed(source, config, task_running, task_sent).await;
        });

        Self {
            running,
            sent,
            handle,
        }
    }

    /// 已注入的事件数 (含 resync)
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// 停止通知流并等待后台任务结束
    pub async fn stop(self) -> u64 {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "scripted feed task failed");
        }
        self.sent.load(Ordering::Relaxed)
    }
}

async fn run_feed(
    source: MockSourceHandle,
    config: FeedConfig,
    running: Arc<AtomicBool>,
    sent: Arc<AtomicU64>,
) {
    let schedule = config.schedule();
    if schedule.is_empty() {
        debug!("scripted feed has nothing to send");
        running.store(false, Ordering::SeqCst);
        return;
    }
    let Some(period) = config.period() else {
        warn!(rate_hz = config.rate_hz, "scripted feed rate is unusable");
        running.store(false, Ordering::SeqCst);
        return;
    };

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut resync = config
        .resync_every
        .filter(|every| !every.is_zero())
        .map(|every| {
            let mut t = interval(every);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
    // The first tick of a tokio interval completes immediately
    if let Some(t) = resync.as_mut() {
        t.tick().await;
    }

    debug!(
        topics = config.topics.len(),
        rate_hz = config.rate_hz,
        "scripted feed started"
    );

    let mut seq: u64 = 0;
    while running.load(Ordering::Relaxed) {
        let event = tokio::select! {
            _ = ticker.tick() => {
                let topic = &schedule[(seq as usize) % schedule.len()];
                seq += 1;
                (topic.clone(), seq.to_string())
            }
            _ = tick_or_pending(resync.as_mut()) => {
                if !source.resync().await {
                    break;
                }
                sent.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let (topic, payload) = event;
        if !source.notify(&topic, &payload).await {
            debug!("scripted feed: event stream closed");
            break;
        }
        sent.fetch_add(1, Ordering::Relaxed);
    }

    running.store(false, Ordering::SeqCst);
    debug!(sent = sent.load(Ordering::Relaxed), "scripted feed stopped");
}

async fn tick_or_pending(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
