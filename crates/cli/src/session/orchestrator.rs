//! Session orchestrator - wires the scripted source, the dispatcher and one
//! consumer task per topic, then tears everything down in order.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::Result;
use contracts::NotifyCondConfig;
use dispatcher::{ConditionChannel, Dispatcher, DispatcherBuilder};
use mock_source::{FeedConfig, MockNotificationSource, MockSourceConfig, ScriptedFeed};
use observability::ConsumerStatsAggregator;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::SessionStats;
use crate::error::CliError;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Loaded configuration, CLI overrides applied
    pub config: NotifyCondConfig,

    /// Session length (None = until the shutdown signal)
    pub duration: Option<Duration>,
}

/// A dispatcher session over the in-process scripted source
pub struct Session {
    config: SessionConfig,
}

impl Session {
    /// Create a new session with the given configuration
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run the session until `duration` elapses or `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<SessionStats> {
        let start_time = Instant::now();
        let config = &self.config.config;

        let (source, source_handle, events) =
            MockNotificationSource::new(MockSourceConfig::from_settings(&config.source));
        let dispatcher = DispatcherBuilder::new(source, events)
            .with_settings(&config.dispatcher)
            .build();

        info!(
            keepalive = ?dispatcher.keepalive_interval(),
            broadcast_on_timeout = dispatcher.broadcast_on_timeout(),
            "Dispatcher started"
        );

        let consumers = match register_topics(&dispatcher, config).await {
            Ok(consumers) => consumers,
            Err(e) => {
                if let Err(close_err) = dispatcher.close().await {
                    warn!(error = %close_err, "Error while closing dispatcher");
                }
                return Err(e.into());
            }
        };
        let registered_topics = consumers.len();
        info!(topics = registered_topics, "Consumers running");

        let feed = ScriptedFeed::start(source_handle, FeedConfig::from_config(config));

        let until_done = async {
            match self.config.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = until_done => info!("Session duration reached"),
            _ = shutdown => warn!("Received shutdown signal, stopping session..."),
        }

        // Shutdown
        info!("Shutting down session...");
        let events_sent = feed.stop().await;
        if let Err(e) = dispatcher.ping().await {
            debug!(error = %e, "Final probe failed");
        }
        let dispatcher_metrics = dispatcher.metrics();
        if let Err(e) = dispatcher.close().await {
            warn!(error = %e, "Error while closing dispatcher");
        }

        // Every channel is closed by now, so the consumers drain and exit
        let mut merged = ConsumerStatsAggregator::new();
        for consumer in consumers {
            match consumer.await {
                Ok(stats) => merged.merge(&stats),
                Err(e) => warn!(error = %e, "Consumer task failed"),
            }
        }

        let stats = SessionStats {
            events_sent,
            registered_topics,
            duration: start_time.elapsed(),
            dispatcher: dispatcher_metrics,
            consumers: merged,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            wakeups = stats.consumers.total_wakeups,
            "Session shutdown complete"
        );

        Ok(stats)
    }
}

/// Register every configured topic and spawn its consumer
async fn register_topics(
    dispatcher: &Dispatcher<MockNotificationSource>,
    config: &NotifyCondConfig,
) -> Result<Vec<JoinHandle<ConsumerStatsAggregator>>, CliError> {
    let mut consumers = Vec::with_capacity(config.topics.len());
    for topic in &config.topics {
        let channel = dispatcher
            .register(topic.name.as_str())
            .await
            .map_err(|e| CliError::register(&topic.name, e))?;
        consumers.push(tokio::spawn(consume(channel)));
    }
    Ok(consumers)
}

/// Drain one condition channel until it closes
async fn consume(mut channel: ConditionChannel) -> ConsumerStatsAggregator {
    let mut stats = ConsumerStatsAggregator::new();
    let mut last_wake: Option<Instant> = None;

    while let Some(condition) = channel.recv().await {
        let now = Instant::now();
        let since_last_ms = last_wake.map(|t| now.duration_since(t).as_secs_f64() * 1000.0);
        last_wake = Some(now);

        trace!(topic = %channel.topic(), condition = ?condition, "Consumer woke up");
        stats.update(channel.topic(), &condition, since_last_ms);
    }

    debug!(
        topic = %channel.topic(),
        wakeups = stats.total_wakeups,
        "Condition channel closed"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TopicConfig;

    fn demo_config(topics: &[&str]) -> NotifyCondConfig {
        let mut config = NotifyCondConfig::default();
        config.source.rate_hz = 200.0;
        config.topics = topics
            .iter()
            .map(|name| TopicConfig {
                name: name.to_string(),
                weight: 1,
            })
            .collect();
        config
    }

    #[tokio::test]
    async fn test_session_runs_for_duration() {
        let session = Session::new(SessionConfig {
            config: demo_config(&["orders", "audit"]),
            duration: Some(Duration::from_millis(200)),
        });

        let stats = session.run(std::future::pending()).await.unwrap();

        assert_eq!(stats.registered_topics, 2);
        assert!(stats.events_sent > 0);
        assert!(stats.consumers.total_wakeups > 0);
        assert!(stats.consumers.total_wakeups <= stats.events_sent);
        assert_eq!(stats.dispatcher.unroutable_count, 0);
    }

    #[tokio::test]
    async fn test_session_stops_on_shutdown_signal() {
        let session = Session::new(SessionConfig {
            config: demo_config(&["orders"]),
            duration: None,
        });

        let stats = session
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(stats.registered_topics, 1);
    }

    #[tokio::test]
    async fn test_session_without_topics() {
        let session = Session::new(SessionConfig {
            config: demo_config(&[]),
            duration: Some(Duration::from_millis(20)),
        });

        let stats = session.run(std::future::pending()).await.unwrap();
        assert_eq!(stats.registered_topics, 0);
        assert_eq!(stats.events_sent, 0);
    }
}
