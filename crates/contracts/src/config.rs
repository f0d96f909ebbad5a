//! NotifyCondConfig - Config Loader output
//!
//! Describes a complete deployment: dispatcher tuning, the source to attach
//! to, the topics to register and how to report on it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyCondConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Dispatcher tuning
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Notification source settings
    #[serde(default)]
    pub source: SourceSettings,

    /// Topics registered at startup
    #[serde(default)]
    pub topics: Vec<TopicConfig>,

    /// Logging and metrics
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

/// Dispatcher tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Idle time before the source is probed (None = never)
    #[serde(default)]
    pub keepalive_interval_ms: Option<u64>,

    /// Send a resync marker to every topic whenever the keepalive fires
    #[serde(default)]
    pub broadcast_on_timeout: bool,
}

impl DispatcherSettings {
    /// Keepalive interval as a `Duration`
    pub fn keepalive_interval(&self) -> Option<Duration> {
        self.keepalive_interval_ms.map(Duration::from_millis)
    }
}

/// Notification source settings
///
/// Only the in-process source is built into the workspace; real database
/// connections are provided by applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Source kind
    #[serde(default)]
    pub kind: SourceKind,

    /// Generated notifications per second, across all topics
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,

    /// Emit a resync every N milliseconds (None = never)
    #[serde(default)]
    pub resync_every_ms: Option<u64>,

    /// Artificial round-trip latency for subscribe/unsubscribe/probe
    #[serde(default)]
    pub latency_ms: u64,

    /// Inbound event queue capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_rate_hz() -> f64 {
    10.0
}

fn default_event_capacity() -> usize {
    256
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            rate_hz: default_rate_hz(),
            resync_every_ms: None,
            latency_ms: 0,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// In-process scripted source
    #[default]
    Mock,
}

/// A topic to register at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic name
    pub name: String,

    /// Relative share of generated traffic (mock source only)
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Default log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port (None = disabled)
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config: NotifyCondConfig =
            serde_json::from_str(r#"{"topics":[{"name":"orders"}]}"#).unwrap();
        assert_eq!(config.version, ConfigVersion::V1);
        assert_eq!(config.topics[0].weight, 1);
        assert_eq!(config.source.kind, SourceKind::Mock);
        assert_eq!(config.source.event_capacity, 256);
        assert!(config.dispatcher.keepalive_interval().is_none());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_keepalive_interval_conversion() {
        let settings = DispatcherSettings {
            keepalive_interval_ms: Some(1500),
            broadcast_on_timeout: true,
        };
        assert_eq!(
            settings.keepalive_interval(),
            Some(Duration::from_millis(1500))
        );
    }
}
