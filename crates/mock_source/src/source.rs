//! Mock 通知源
//!
//! 行为与真实连接一致：重复订阅返回 `AlreadySubscribed`，取消未订阅的
//! topic 返回 `NotSubscribed`，关闭后所有调用返回 `Closed`。
//! 通知通过 `MockSourceHandle` 注入，不检查 topic 是否已订阅，
//! 以模拟取消订阅前已在途的通知。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{Notification, NotificationSource, SenderId, SourceError, SourceEvent};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use crate::config::MockSourceConfig;

/// 默认的发送方会话 ID
const DEFAULT_SENDER_ID: SenderId = 4242;

/// 源与句柄共享的状态
#[derive(Debug)]
struct MockState {
    config: Mutex<MockSourceConfig>,
    subscribed: Mutex<HashSet<String>>,
    events_tx: Mutex<Option<mpsc::Sender<SourceEvent>>>,
    closed: AtomicBool,
    begin_count: AtomicU64,
    end_count: AtomicU64,
    probe_count: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock 通知源
#[derive(Debug)]
pub struct MockNotificationSource {
    state: Arc<MockState>,
}

/// 测试侧句柄：注入事件、观察源的状态
#[derive(Debug, Clone)]
pub struct MockSourceHandle {
    state: Arc<MockState>,
}

impl MockNotificationSource {
    /// 使用配置创建 mock 源
    ///
    /// 返回源本身、测试侧句柄以及入站事件流的接收端。
    pub fn new(
        config: MockSourceConfig,
    ) -> (Self, MockSourceHandle, mpsc::Receiver<SourceEvent>) {
        let (tx, rx) = mpsc::channel(config.event_capacity.max(1));
        let state = Arc::new(MockState {
            config: Mutex::new(config),
            subscribed: Mutex::new(HashSet::new()),
            events_tx: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            begin_count: AtomicU64::new(0),
            end_count: AtomicU64::new(0),
            probe_count: AtomicU64::new(0),
        });
        let handle = MockSourceHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle, rx)
    }

    /// 创建默认 mock 源
    pub fn with_defaults() -> (Self, MockSourceHandle, mpsc::Receiver<SourceEvent>) {
        Self::new(MockSourceConfig::default())
    }

    fn config(&self) -> MockSourceConfig {
        lock(&self.state.config).clone()
    }

    fn ensure_open(&self) -> Result<(), SourceError> {
        if self.state.closed.load(Ordering::SeqCst) {
            Err(SourceError::Closed)
        } else {
            Ok(())
        }
    }

    /// 模拟一次网络往返
    async fn round_trip(&self) {
        let latency = lock(&self.state.config).latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl NotificationSource for MockNotificationSource {
    #[instrument(name = "mock_source_begin_topic", skip(self), fields(topic = %topic))]
    async fn begin_topic(&self, topic: &str) -> Result<(), SourceError> {
        self.state.begin_count.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await;
        self.ensure_open()?;

        if self.config().fail_begin.iter().any(|t| t == topic) {
            return Err(SourceError::connection(format!(
                "mock failure subscribing '{topic}'"
            )));
        }

        if !lock(&self.state.subscribed).insert(topic.to_string()) {
            return Err(SourceError::AlreadySubscribed {
                topic: topic.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(name = "mock_source_end_topic", skip(self), fields(topic = %topic))]
    async fn end_topic(&self, topic: &str) -> Result<(), SourceError> {
        self.state.end_count.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await;
        self.ensure_open()?;

        if self.config().fail_end.iter().any(|t| t == topic) {
            return Err(SourceError::connection(format!(
                "mock failure unsubscribing '{topic}'"
            )));
        }

        if !lock(&self.state.subscribed).remove(topic) {
            return Err(SourceError::NotSubscribed {
                topic: topic.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(name = "mock_source_probe", skip(self))]
    async fn probe(&self) -> Result<(), SourceError> {
        self.state.probe_count.fetch_add(1, Ordering::SeqCst);
        let config = self.config();
        if config.hang_probe {
            std::future::pending::<()>().await;
        }
        self.round_trip().await;
        self.ensure_open()?;

        if config.fail_probe {
            return Err(SourceError::connection("mock probe failure"));
        }
        Ok(())
    }

    #[instrument(name = "mock_source_close", skip(self))]
    async fn close(&self) -> Result<(), SourceError> {
        let close_latency = lock(&self.state.config).close_latency;
        if !close_latency.is_zero() {
            tokio::time::sleep(close_latency).await;
        }

        if self.state.closed.swap(true, Ordering::SeqCst) {
            return Err(SourceError::Closed);
        }

        // 关闭连接即结束事件流
        lock(&self.state.events_tx).take();
        lock(&self.state.subscribed).clear();
        debug!("mock source closed");

        if self.config().fail_close {
            return Err(SourceError::connection("mock close failure"));
        }
        Ok(())
    }
}

impl MockSourceHandle {
    /// 注入一条通知，使用默认发送方 ID
    ///
    /// 事件流已结束时返回 false。
    pub async fn notify(&self, topic: &str, payload: &str) -> bool {
        self.notify_from(topic, payload, DEFAULT_SENDER_ID).await
    }

    /// 注入一条指定发送方的通知
    pub async fn notify_from(&self, topic: &str, payload: &str, sender_id: SenderId) -> bool {
        self.inject(SourceEvent::Notification(Notification::new(
            topic, payload, sender_id,
        )))
        .await
    }

    /// 注入 resync 事件 (例如重连之后)
    pub async fn resync(&self) -> bool {
        self.inject(SourceEvent::Resync).await
    }

    /// 注入任意事件
    pub async fn inject(&self, event: SourceEvent) -> bool {
        let tx = lock(&self.state.events_tx).clone();
        match tx {
            Some(tx) => {
                trace!(?event, "mock event injected");
                tx.send(event).await.is_ok()
            }
            None => false,
        }
    }

    /// 结束事件流，但不关闭连接
    pub fn end_stream(&self) {
        lock(&self.state.events_tx).take();
    }

    /// 运行时修改配置 (失败注入、延迟)
    pub fn update_config(&self, f: impl FnOnce(&mut MockSourceConfig)) {
        f(&mut lock(&self.state.config));
    }

    /// 当前已订阅的 topics
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = lock(&self.state.subscribed).iter().cloned().collect();
        topics.sort();
        topics
    }

    /// 指定 topic 是否已订阅
    pub fn is_subscribed(&self, topic: &str) -> bool {
        lock(&self.state.subscribed).contains(topic)
    }

    /// 连接是否已关闭
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// 订阅调用次数
    pub fn begin_count(&self) -> u64 {
        self.state.begin_count.load(Ordering::SeqCst)
    }

    /// 取消订阅调用次数
    pub fn end_count(&self) -> u64 {
        self.state.end_count.load(Ordering::SeqCst)
    }

    /// 探活调用次数
    pub fn probe_count(&self) -> u64 {
        self.state.probe_count.load(Ordering::SeqCst)
    }
}
