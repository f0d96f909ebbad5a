//! Mock 通知源配置

use std::time::Duration;

use contracts::SourceSettings;

/// Mock 通知源配置
///
/// 通过配置注入失败场景。
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// 订阅时应该失败的 topics
    pub fail_begin: Vec<String>,
    /// 取消订阅时应该失败的 topics
    pub fail_end: Vec<String>,
    /// 探活是否失败
    pub fail_probe: bool,
    /// 探活是否永不返回
    pub hang_probe: bool,
    /// 关闭是否返回错误 (连接仍会被关闭)
    pub fail_close: bool,
    /// 每次往返的人为延迟
    pub latency: Duration,
    /// 关闭连接的人为延迟
    pub close_latency: Duration,
    /// 入站事件队列容量
    pub event_capacity: usize,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            fail_begin: Vec::new(),
            fail_end: Vec::new(),
            fail_probe: false,
            hang_probe: false,
            fail_close: false,
            latency: Duration::ZERO,
            close_latency: Duration::ZERO,
            event_capacity: 64,
        }
    }
}

impl MockSourceConfig {
    /// 从配置文件的 `[source]` 段构建
    pub fn from_settings(settings: &SourceSettings) -> Self {
        Self {
            latency: Duration::from_millis(settings.latency_ms),
            event_capacity: settings.event_capacity.max(1),
            ..Default::default()
        }
    }

    /// 设置往返延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 设置关闭延迟
    pub fn with_close_latency(mut self, latency: Duration) -> Self {
        self.close_latency = latency;
        self
    }

    /// 让指定 topic 的订阅失败
    pub fn failing_begin(mut self, topic: impl Into<String>) -> Self {
        self.fail_begin.push(topic.into());
        self
    }

    /// 让指定 topic 的取消订阅失败
    pub fn failing_end(mut self, topic: impl Into<String>) -> Self {
        self.fail_end.push(topic.into());
        self
    }
}
