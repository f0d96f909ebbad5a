//! # Mock Source
//!
//! 进程内通知源，无需数据库即可驱动 Dispatcher。
//!
//! 负责：
//! - 实现 `NotificationSource`，订阅状态语义与真实连接一致
//! - 注入失败与延迟，用于覆盖注册竞争窗口
//! - 按脚本生成通知流 (`ScriptedFeed`)

mod config;
mod feed;
mod source;

pub use config::MockSourceConfig;
pub use feed::{FeedConfig, ScriptedFeed};
pub use source::{MockNotificationSource, MockSourceHandle};
