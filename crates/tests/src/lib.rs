//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 -> mock 源 -> 分发器 的端到端测试（无需数据库）
//! - 注册竞态窗口与关闭语义的场景测试

#[cfg(test)]
mod contract_tests {
    use contracts::{Condition, Notification, SourceEvent};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_resync_is_a_null_condition() {
        let event: SourceEvent = Notification::new("orders", "42", 7).into();
        assert!(matches!(event, SourceEvent::Notification(_)));
        assert!(Condition::Resync.notification().is_none());
        assert!(Condition::Resync.is_resync());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::Condition;
    use dispatcher::{
        Dispatcher, DispatcherBuilder, DispatcherError, DispatcherState, MetricsSnapshot,
        TryRecvError,
    };
    use mock_source::{
        FeedConfig, MockNotificationSource, MockSourceConfig, MockSourceHandle, ScriptedFeed,
    };
    use observability::ConsumerStatsAggregator;
    use tokio::time::{sleep, timeout};

    type MockDispatcher = Dispatcher<MockNotificationSource>;

    const CONFIG: &str = r#"
[dispatcher]
keepalive_interval_ms = 50
broadcast_on_timeout = true

[source]
rate_hz = 500.0

[[topics]]
name = "orders"
weight = 3

[[topics]]
name = "audit"
"#;

    fn setup(config: MockSourceConfig) -> (MockDispatcher, MockSourceHandle) {
        let (source, handle, events) = MockNotificationSource::new(config);
        (Dispatcher::new(source, events), handle)
    }

    async fn settle(dispatcher: &MockDispatcher, done: impl Fn(&MetricsSnapshot) -> bool) {
        for _ in 0..400 {
            if done(&dispatcher.metrics()) {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("dispatcher did not settle: {:?}", dispatcher.metrics());
    }

    /// End-to-end test: config file -> ScriptedFeed -> Dispatcher -> consumers
    ///
    /// 验证完整的数据流：
    /// 1. ConfigLoader 解析并校验配置
    /// 2. ScriptedFeed 按权重在各 topic 上生成通知
    /// 3. 消费端读到的唤醒次数不超过发送的通知数 (合并语义)
    #[tokio::test]
    async fn test_e2e_config_driven_session() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();

        let (source, handle, events) =
            MockNotificationSource::new(MockSourceConfig::from_settings(&config.source));
        let dispatcher = DispatcherBuilder::new(source, events)
            .with_settings(&config.dispatcher)
            .build();

        let mut consumers = Vec::new();
        for topic in &config.topics {
            let mut channel = dispatcher.register(topic.name.as_str()).await.unwrap();
            consumers.push(tokio::spawn(async move {
                let mut stats = ConsumerStatsAggregator::new();
                while let Some(condition) = channel.recv().await {
                    stats.update(channel.topic(), &condition, None);
                }
                stats
            }));
        }

        let feed = ScriptedFeed::start(handle.clone(), FeedConfig::from_config(&config));
        sleep(Duration::from_millis(150)).await;
        let sent = feed.stop().await;
        assert!(sent > 0);

        settle(&dispatcher, |m| m.delivered_count + m.coalesced_count >= sent).await;
        timeout(Duration::from_secs(2), dispatcher.close())
            .await
            .expect("close hung")
            .unwrap();

        let mut merged = ConsumerStatsAggregator::new();
        for consumer in consumers {
            let stats = timeout(Duration::from_secs(2), consumer)
                .await
                .expect("consumer did not observe channel close")
                .unwrap();
            merged.merge(&stats);
        }

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.unroutable_count, 0);
        assert!(merged.total_wakeups > 0);
        assert!(merged.wakeups_per_topic.contains_key("orders"));
        assert!(handle.is_closed());
        assert!(handle.subscribed_topics().is_empty());
    }

    /// A burst with no interleaved read is observed as exactly one wake-up
    #[tokio::test]
    async fn test_burst_coalesces_to_single_wakeup() {
        let (dispatcher, handle) = setup(MockSourceConfig::default());
        let mut orders = dispatcher.register("orders").await.unwrap();

        for i in 0..50 {
            assert!(handle.notify("orders", &i.to_string()).await);
        }
        settle(&dispatcher, |m| m.delivered_count + m.coalesced_count == 50).await;

        let first = orders.try_recv().unwrap();
        assert_eq!(first.notification().map(|n| n.payload.as_str()), Some("0"));
        assert_eq!(orders.try_recv(), Err(TryRecvError::Empty));

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.delivered_count, 1);
        assert_eq!(metrics.coalesced_count, 49);
    }

    /// Resync reaches every topic registered at that moment and none registered later
    #[tokio::test]
    async fn test_resync_fan_out_tracks_registrations() {
        let (dispatcher, handle) = setup(MockSourceConfig::default());
        let mut a = dispatcher.register("a").await.unwrap();
        let mut b = dispatcher.register("b").await.unwrap();

        assert!(handle.resync().await);
        settle(&dispatcher, |m| m.broadcast_count == 1).await;
        assert_eq!(a.try_recv(), Ok(Condition::Resync));
        assert_eq!(b.try_recv(), Ok(Condition::Resync));

        dispatcher.deregister("a").await.unwrap();
        let mut c = dispatcher.register("c").await.unwrap();
        assert!(handle.resync().await);
        settle(&dispatcher, |m| m.broadcast_count == 2).await;

        assert_eq!(a.try_recv(), Err(TryRecvError::Closed));
        assert_eq!(b.try_recv(), Ok(Condition::Resync));
        assert_eq!(c.try_recv(), Ok(Condition::Resync));
    }

    /// A slow subscribe acknowledgement must not lose a notification sent meanwhile
    #[tokio::test]
    async fn test_delayed_subscribe_ack_still_routes() {
        let (dispatcher, handle) =
            setup(MockSourceConfig::default().with_latency(Duration::from_millis(100)));

        let registering = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.register("orders").await })
        };
        sleep(Duration::from_millis(20)).await;

        // The mapping exists before the source acknowledges
        assert!(dispatcher.is_registered("orders"));
        assert!(matches!(
            dispatcher.register("orders").await,
            Err(DispatcherError::TopicBusy { .. })
        ));
        assert!(handle.notify("orders", "early").await);

        let mut orders = registering.await.unwrap().unwrap();
        let condition = timeout(Duration::from_secs(1), orders.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(condition.notification().unwrap().payload, "early");
    }

    /// Close always returns, even with consumers that never read
    #[tokio::test]
    async fn test_close_with_idle_consumers() {
        let (dispatcher, handle) = setup(MockSourceConfig::default());
        let mut channels = Vec::new();
        for topic in ["a", "b", "c"] {
            channels.push(dispatcher.register(topic).await.unwrap());
        }
        for topic in ["a", "b", "c", "a", "b", "c"] {
            handle.notify(topic, "x").await;
        }

        timeout(Duration::from_secs(1), dispatcher.close())
            .await
            .expect("close hung")
            .unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Closed);

        for channel in &mut channels {
            let drained = timeout(Duration::from_millis(100), async {
                while channel.recv().await.is_some() {}
            })
            .await;
            assert!(drained.is_ok(), "{} never closed", channel.topic());
        }

        assert!(matches!(
            dispatcher.register("d").await,
            Err(DispatcherError::Closed)
        ));
        assert_eq!(dispatcher.close().await, Err(DispatcherError::Closed));
    }

    /// Source stream termination shuts the dispatcher down like close()
    #[tokio::test]
    async fn test_stream_end_closes_channels() {
        let (dispatcher, handle) = setup(MockSourceConfig::default());
        let mut orders = dispatcher.register("orders").await.unwrap();

        handle.end_stream();
        let next = timeout(Duration::from_secs(1), orders.recv()).await.unwrap();
        assert!(next.is_none());

        for _ in 0..200 {
            if dispatcher.state() == DispatcherState::Closed {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
        assert!(handle.is_closed());
    }

    /// Keepalive with broadcast: silence produces probes and resync markers
    #[tokio::test(start_paused = true)]
    async fn test_keepalive_broadcast_on_silence() {
        let (source, handle, events) = MockNotificationSource::with_defaults();
        let dispatcher = DispatcherBuilder::new(source, events)
            .keepalive_interval(Some(Duration::from_secs(10)))
            .broadcast_on_timeout(true)
            .build();
        let mut orders = dispatcher.register("orders").await.unwrap();

        sleep(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;

        assert!(dispatcher.metrics().keepalive_count >= 1);
        assert!(handle.probe_count() >= 1);
        assert_eq!(orders.try_recv(), Ok(Condition::Resync));
    }

    /// Many producers against one topic never leave more than one pending value
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_single_pending() {
        let (dispatcher, handle) = setup(MockSourceConfig::default());
        let mut orders = dispatcher.register("orders").await.unwrap();

        let mut producers = Vec::new();
        for p in 0..4 {
            let handle = handle.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..100 {
                    handle.notify_from("orders", &format!("{p}-{i}"), p).await;
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        settle(&dispatcher, |m| m.delivered_count + m.coalesced_count == 400).await;

        assert!(orders.try_recv().is_ok());
        assert_eq!(orders.try_recv(), Err(TryRecvError::Empty));
    }
}
