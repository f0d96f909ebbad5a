//! 配置校验模块
//!
//! 校验规则：
//! - topic 名称非空、唯一、不超过 63 字节
//! - topic 权重 > 0
//! - keepalive 间隔 > 0 (若设置)
//! - 通知源频率 > 0，resync 周期 > 0 (若设置)

use std::collections::HashSet;

use contracts::{ContractError, NotifyCondConfig};

/// 数据库标识符的最大长度 (字节)
pub const MAX_TOPIC_LEN: usize = 63;

/// 校验 NotifyCondConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &NotifyCondConfig) -> Result<(), ContractError> {
    validate_topics(config)?;
    validate_dispatcher(config)?;
    validate_source(config)?;
    Ok(())
}

/// 校验 topic 名称与权重
fn validate_topics(config: &NotifyCondConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, topic) in config.topics.iter().enumerate() {
        if topic.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("topics[{}].name", idx),
                "topic name cannot be empty",
            ));
        }
        if topic.name.len() > MAX_TOPIC_LEN {
            return Err(ContractError::config_validation(
                format!("topics[name={}]", topic.name),
                format!(
                    "topic name is {} bytes, limit is {}",
                    topic.name.len(),
                    MAX_TOPIC_LEN
                ),
            ));
        }
        if topic.weight == 0 {
            return Err(ContractError::config_validation(
                format!("topics[name={}].weight", topic.name),
                "weight must be > 0",
            ));
        }
        if !seen.insert(&topic.name) {
            return Err(ContractError::config_validation(
                format!("topics[name={}]", topic.name),
                "duplicate topic name",
            ));
        }
    }
    Ok(())
}

/// 校验分发器配置
fn validate_dispatcher(config: &NotifyCondConfig) -> Result<(), ContractError> {
    if config.dispatcher.keepalive_interval_ms == Some(0) {
        return Err(ContractError::config_validation(
            "dispatcher.keepalive_interval_ms",
            "keepalive interval must be > 0; omit it to disable keepalive",
        ));
    }
    Ok(())
}

/// 校验通知源配置
fn validate_source(config: &NotifyCondConfig) -> Result<(), ContractError> {
    let source = &config.source;

    if !source.rate_hz.is_finite() || source.rate_hz <= 0.0 {
        return Err(ContractError::config_validation(
            "source.rate_hz",
            format!("rate_hz must be a finite number > 0, got {}", source.rate_hz),
        ));
    }

    if source.resync_every_ms == Some(0) {
        return Err(ContractError::config_validation(
            "source.resync_every_ms",
            "resync period must be > 0; omit it to disable resyncs",
        ));
    }

    if source.event_capacity == 0 {
        return Err(ContractError::config_validation(
            "source.event_capacity",
            "event capacity must be > 0",
        ));
    }

    Ok(())
}
