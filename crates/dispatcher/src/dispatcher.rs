//! Dispatcher - the registration API in front of the control loop

use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{DispatcherSettings, NotificationSource, SourceEvent, Topic};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::channel::{condition_channel, ConditionChannel};
use crate::error::DispatcherError;
use crate::event_loop::{ControlLoop, LoopInputs};
use crate::metrics::{DispatcherMetrics, MetricsSnapshot};
use crate::registry::{lock, DispatcherState, InFlightGuard, Registry, SharedRegistry};

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder<S> {
    source: S,
    events: mpsc::Receiver<SourceEvent>,
    keepalive_interval: Option<Duration>,
    broadcast_on_timeout: bool,
}

impl<S> DispatcherBuilder<S>
where
    S: NotificationSource + Sync + 'static,
{
    /// Create a new DispatcherBuilder
    ///
    /// `events` is the source's inbound event sequence. The dispatcher owns
    /// both for the rest of its life.
    pub fn new(source: S, events: mpsc::Receiver<SourceEvent>) -> Self {
        Self {
            source,
            events,
            keepalive_interval: None,
            broadcast_on_timeout: false,
        }
    }

    /// Probe the source after this much idle time
    pub fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Send a resync marker to every topic whenever the keepalive fires
    pub fn broadcast_on_timeout(mut self, enabled: bool) -> Self {
        self.broadcast_on_timeout = enabled;
        self
    }

    /// Apply the `[dispatcher]` section of a configuration file
    pub fn with_settings(self, settings: &DispatcherSettings) -> Self {
        self.keepalive_interval(settings.keepalive_interval())
            .broadcast_on_timeout(settings.broadcast_on_timeout)
    }

    /// Spawn the control loop and return the handle
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(keepalive = ?self.keepalive_interval, broadcast = self.broadcast_on_timeout)
    )]
    pub fn build(self) -> Dispatcher<S> {
        let registry: SharedRegistry = Arc::new(Mutex::new(Registry::new(
            self.broadcast_on_timeout,
        )));
        let source = Arc::new(self.source);
        let metrics = Arc::new(DispatcherMetrics::new());
        let (close_tx, close_rx) = oneshot::channel();
        let (interval_tx, interval_rx) = watch::channel(normalize(self.keepalive_interval));

        let control = ControlLoop::new(
            Arc::clone(&registry),
            Arc::clone(&source),
            Arc::clone(&metrics),
        );
        let inputs = LoopInputs {
            events: self.events,
            close_rx,
            interval_rx,
        };
        let loop_handle = tokio::spawn(async move {
            control.run(inputs).await;
        });

        Dispatcher {
            shared: Arc::new(Shared {
                registry,
                source,
                metrics,
                interval_tx,
                close_tx: Mutex::new(Some(close_tx)),
                loop_handle: Mutex::new(Some(loop_handle)),
            }),
        }
    }
}

/// A zero interval would spin the loop; treat it as "off"
fn normalize(interval: Option<Duration>) -> Option<Duration> {
    match interval {
        Some(d) if d.is_zero() => {
            warn!("Zero keepalive interval requested, keepalive disabled");
            None
        }
        other => other,
    }
}

/// State owned by the handles
///
/// The control loop holds the registry, source and metrics but not this
/// struct, so dropping every handle drops `close_tx` and stops the loop.
struct Shared<S> {
    registry: SharedRegistry,
    source: Arc<S>,
    metrics: Arc<DispatcherMetrics>,
    interval_tx: watch::Sender<Option<Duration>>,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Fans one source's notifications out to per-topic condition channels
///
/// Cheap to clone; every clone talks to the same control loop. Concurrent
/// calls for different topics are safe. Lifecycle calls for the same topic
/// should be serialized by the caller; overlapping ones fail with
/// `DispatcherError::TopicBusy`.
pub struct Dispatcher<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> Dispatcher<S>
where
    S: NotificationSource + Sync + 'static,
{
    /// Create a dispatcher with keepalive disabled
    pub fn new(source: S, events: mpsc::Receiver<SourceEvent>) -> Self {
        DispatcherBuilder::new(source, events).build()
    }

    /// Start delivering notifications for `topic`
    ///
    /// The channel is mapped before the source is asked to subscribe, so a
    /// notification arriving during the round-trip is not lost. If the
    /// source refuses, or the returned future is dropped before the source
    /// answers, the mapping is rolled back.
    ///
    /// # Errors
    /// `Closed` after shutdown began, `AlreadyRegistered` for a live topic,
    /// `TopicBusy` while another lifecycle call on the topic is in progress,
    /// or the source's error.
    #[instrument(name = "dispatcher_register", skip_all)]
    pub async fn register(
        &self,
        topic: impl Into<Topic>,
    ) -> Result<ConditionChannel, DispatcherError> {
        let topic = topic.into();

        let (channel, mut guard) = {
            let mut registry = lock(&self.shared.registry);
            registry.ensure_open()?;
            if registry.is_in_flight(&topic) {
                return Err(DispatcherError::topic_busy(topic));
            }
            if registry.contains(&topic) {
                return Err(DispatcherError::already_registered(topic));
            }

            let id = registry.allocate_id();
            let (sender, channel) = condition_channel(id, &topic);
            registry.insert(topic.clone(), sender);
            registry.begin_in_flight(&topic);
            self.shared.metrics.set_registered(registry.len());
            let guard = InFlightGuard::registering(
                Arc::clone(&self.shared.registry),
                Arc::clone(&self.shared.metrics),
                topic.clone(),
                id,
            );
            (channel, guard)
        };

        if let Err(e) = self.shared.source.begin_topic(&topic).await {
            warn!(topic = %topic, error = %e, "Source refused subscription");
            return Err(e.into());
        }
        guard.disarm();

        debug!(topic = %topic, "Topic registered");
        Ok(channel)
    }

    /// Stop delivering notifications for `topic` and close its channel
    ///
    /// If the source fails to unsubscribe, nothing changes and the topic
    /// stays deliverable.
    ///
    /// # Errors
    /// `Closed` after shutdown began, `NotRegistered` for an unknown topic,
    /// `TopicBusy` while another lifecycle call on the topic is in progress,
    /// or the source's error.
    #[instrument(name = "dispatcher_deregister", skip(self))]
    pub async fn deregister(&self, topic: &str) -> Result<(), DispatcherError> {
        let (id, _guard) = {
            let mut registry = lock(&self.shared.registry);
            registry.ensure_open()?;
            if registry.is_in_flight(topic) {
                return Err(DispatcherError::topic_busy(topic));
            }
            let id = registry
                .registration_id(topic)
                .ok_or_else(|| DispatcherError::not_registered(topic))?;
            registry.begin_in_flight(topic);
            let guard = InFlightGuard::new(
                Arc::clone(&self.shared.registry),
                Arc::clone(&self.shared.metrics),
                topic.to_string(),
            );
            (id, guard)
        };

        self.shared.source.end_topic(topic).await?;

        let mut registry = lock(&self.shared.registry);
        // Shutdown may have drained the map during the round-trip
        if registry.state() == DispatcherState::Open {
            // Dropping the sender closes the consumer's channel
            drop(registry.remove_checked(topic, id));
            self.shared.metrics.set_registered(registry.len());
        }

        debug!(topic = %topic, "Topic deregistered");
        Ok(())
    }

    /// Probe the source now
    pub async fn ping(&self) -> Result<(), DispatcherError> {
        self.shared.source.probe().await.map_err(Into::into)
    }

    /// Change how long the connection may stay idle before it is probed
    ///
    /// `None` (or zero) disables the keepalive. Takes effect on the loop's
    /// next iteration; if several callers race, the last write wins.
    pub fn set_keepalive_interval(&self, interval: Option<Duration>) {
        self.shared.interval_tx.send_replace(normalize(interval));
    }

    /// Choose whether each keepalive firing also broadcasts a resync marker
    pub fn set_broadcast_on_timeout(&self, enabled: bool) {
        lock(&self.shared.registry).set_broadcast_on_timeout(enabled);
    }

    /// Shut down: close every condition channel, then close the source
    ///
    /// Does not return until every channel is closed, so a consumer never
    /// sees the source go away before its own channel does. The teardown
    /// runs in its own task: dropping the returned future early still
    /// closes the source and reaches `Closed`.
    ///
    /// # Errors
    /// `Closed` if shutdown already began, otherwise the source's close error.
    #[instrument(name = "dispatcher_close", skip(self))]
    pub async fn close(&self) -> Result<(), DispatcherError> {
        let close_tx = {
            let mut registry = lock(&self.shared.registry);
            registry.ensure_open()?;
            registry.set_state(DispatcherState::Closing);
            take(&self.shared.close_tx)
        };

        if let Some(close_tx) = close_tx {
            // The loop may already be exiting on its own; it checks the state
            let _ = close_tx.send(());
        }

        let loop_handle = take(&self.shared.loop_handle);
        let registry = Arc::clone(&self.shared.registry);
        let source = Arc::clone(&self.shared.source);
        let teardown = tokio::spawn(async move {
            if let Some(handle) = loop_handle {
                if let Err(e) = handle.await {
                    error!(error = ?e, "Dispatcher loop panicked");
                }
            }

            let result = source.close().await;
            lock(&registry).set_state(DispatcherState::Closed);
            info!(ok = result.is_ok(), "Dispatcher closed");
            result
        });

        match teardown.await {
            Ok(result) => result.map_err(Into::into),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // The runtime is shutting down underneath us
            Err(_) => Err(DispatcherError::Closed),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> DispatcherState {
        lock(&self.shared.registry).state()
    }

    /// Whether `topic` has a live subscription
    pub fn is_registered(&self, topic: &str) -> bool {
        lock(&self.shared.registry).contains(topic)
    }

    /// Registered topics, sorted
    pub fn registered_topics(&self) -> Vec<Topic> {
        lock(&self.shared.registry).topics()
    }

    /// Whether keepalive firings broadcast a resync marker
    pub fn broadcast_on_timeout(&self) -> bool {
        lock(&self.shared.registry).broadcast_on_timeout()
    }

    /// Current keepalive interval
    pub fn keepalive_interval(&self) -> Option<Duration> {
        *self.shared.interval_tx.borrow()
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TryRecvError;
    use contracts::{Condition, SourceError};
    use mock_source::{MockNotificationSource, MockSourceConfig, MockSourceHandle};
    use tokio::time::{sleep, timeout};

    type MockDispatcher = Dispatcher<MockNotificationSource>;

    fn setup(config: MockSourceConfig) -> (MockDispatcher, MockSourceHandle) {
        let (source, handle, events) = MockNotificationSource::new(config);
        (Dispatcher::new(source, events), handle)
    }

    /// Wait until the control loop has caught up with injected events
    async fn settle(dispatcher: &MockDispatcher, done: impl Fn(&MetricsSnapshot) -> bool) {
        for _ in 0..200 {
            if done(&dispatcher.metrics()) {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("dispatcher did not settle: {:?}", dispatcher.metrics());
    }

    #[tokio::test]
    async fn test_register_deregister_register() {
        let (dispatcher, source) = setup(MockSourceConfig::default());

        let _first = dispatcher.register("orders").await.unwrap();
        assert!(source.is_subscribed("orders"));
        dispatcher.deregister("orders").await.unwrap();
        assert!(!source.is_subscribed("orders"));

        let _second = dispatcher.register("orders").await.unwrap();
        assert_eq!(dispatcher.registered_topics(), vec!["orders".to_string()]);
        assert_eq!(dispatcher.metrics().registered, 1);
    }

    #[tokio::test]
    async fn test_duplicate_register_leaves_subscription_intact() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        let mut channel = dispatcher.register("orders").await.unwrap();

        let err = dispatcher.register("orders").await.unwrap_err();
        assert_eq!(err, DispatcherError::already_registered("orders"));
        // The duplicate never reached the source
        assert_eq!(source.begin_count(), 1);

        source.notify("orders", "42").await;
        let condition = timeout(Duration::from_secs(1), channel.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(condition.notification().unwrap().payload, "42");
    }

    #[tokio::test]
    async fn test_notifications_coalesce() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        let mut channel = dispatcher.register("orders").await.unwrap();

        source.notify("orders", "42").await;
        source.notify("orders", "42").await;
        settle(&dispatcher, |m| m.delivered_count + m.coalesced_count == 2).await;

        assert!(channel.is_pending());
        assert!(matches!(channel.try_recv(), Ok(Condition::Notify(_))));
        assert_eq!(channel.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(dispatcher.metrics().coalesced_count, 1);
    }

    #[tokio::test]
    async fn test_resync_reaches_only_registered_topics() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        let mut a = dispatcher.register("a").await.unwrap();
        let mut b = dispatcher.register("b").await.unwrap();

        source.resync().await;
        settle(&dispatcher, |m| m.broadcast_count == 1).await;
        assert_eq!(a.try_recv(), Ok(Condition::Resync));
        assert_eq!(b.try_recv(), Ok(Condition::Resync));

        dispatcher.deregister("a").await.unwrap();
        source.resync().await;
        settle(&dispatcher, |m| m.broadcast_count == 2).await;

        assert_eq!(b.try_recv(), Ok(Condition::Resync));
        assert_eq!(a.recv().await, None);
    }

    #[tokio::test]
    async fn test_resync_not_replayed_to_later_registrations() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        let _a = dispatcher.register("a").await.unwrap();

        source.resync().await;
        settle(&dispatcher, |m| m.broadcast_count == 1).await;

        let mut late = dispatcher.register("late").await.unwrap();
        assert_eq!(late.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_deregister_unknown_topic() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        let _a = dispatcher.register("a").await.unwrap();

        let err = dispatcher.deregister("never").await.unwrap_err();
        assert_eq!(err, DispatcherError::not_registered("never"));
        assert_eq!(source.end_count(), 0);
        assert_eq!(dispatcher.registered_topics(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_register_rolls_back() {
        let (dispatcher, source) = setup(MockSourceConfig::default().failing_begin("bad"));

        let err = dispatcher.register("bad").await.unwrap_err();
        assert!(matches!(err, DispatcherError::Source(SourceError::Connection { .. })));
        assert!(!dispatcher.is_registered("bad"));
        assert_eq!(dispatcher.metrics().registered, 0);

        source.update_config(|c| c.fail_begin.clear());
        assert!(dispatcher.register("bad").await.is_ok());
    }

    #[tokio::test]
    async fn test_source_already_subscribed_maps_to_already_registered() {
        let (source, handle, events) = MockNotificationSource::with_defaults();
        source.begin_topic("orders").await.unwrap();
        let dispatcher = Dispatcher::new(source, events);

        let err = dispatcher.register("orders").await.unwrap_err();
        assert_eq!(err, DispatcherError::already_registered("orders"));
        assert!(!dispatcher.is_registered("orders"));
        assert!(handle.is_subscribed("orders"));
    }

    #[tokio::test]
    async fn test_failed_deregister_keeps_topic_deliverable() {
        let (dispatcher, source) = setup(MockSourceConfig::default().failing_end("sticky"));
        let mut channel = dispatcher.register("sticky").await.unwrap();

        assert!(dispatcher.deregister("sticky").await.is_err());
        assert!(dispatcher.is_registered("sticky"));

        source.notify("sticky", "still here").await;
        let condition = timeout(Duration::from_secs(1), channel.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(condition.notification().unwrap().payload, "still here");
    }

    #[tokio::test]
    async fn test_close_with_undrained_consumer() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        let mut a = dispatcher.register("a").await.unwrap();
        let mut b = dispatcher.register("b").await.unwrap();
        source.notify("a", "pending").await;
        settle(&dispatcher, |m| m.delivered_count == 1).await;

        // A reader blocked on an empty channel is released by close
        let reader = tokio::spawn(async move { b.recv().await });

        timeout(Duration::from_secs(1), dispatcher.close())
            .await
            .expect("close must not hang")
            .unwrap();

        assert_eq!(reader.await.unwrap(), None);
        assert!(a.is_closed());
        assert!(matches!(a.recv().await, Some(Condition::Notify(_))));
        assert_eq!(a.recv().await, None);
        assert!(source.is_closed());
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
    }

    #[tokio::test]
    async fn test_calls_after_close_fail_closed() {
        let (dispatcher, _source) = setup(MockSourceConfig::default());
        let _a = dispatcher.register("a").await.unwrap();
        dispatcher.close().await.unwrap();

        assert_eq!(dispatcher.register("b").await.unwrap_err(), DispatcherError::Closed);
        assert_eq!(dispatcher.deregister("a").await.unwrap_err(), DispatcherError::Closed);
        assert_eq!(dispatcher.close().await.unwrap_err(), DispatcherError::Closed);
        assert!(dispatcher.registered_topics().is_empty());
    }

    #[tokio::test]
    async fn test_close_surfaces_source_error_after_draining() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        source.update_config(|c| c.fail_close = true);
        let mut a = dispatcher.register("a").await.unwrap();

        let err = dispatcher.close().await.unwrap_err();
        assert!(matches!(err, DispatcherError::Source(SourceError::Connection { .. })));
        assert_eq!(a.recv().await, None);
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
    }

    #[tokio::test]
    async fn test_stream_end_closes_everything() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        let mut a = dispatcher.register("a").await.unwrap();

        source.end_stream();
        assert_eq!(timeout(Duration::from_secs(1), a.recv()).await.unwrap(), None);

        for _ in 0..200 {
            if dispatcher.state() == DispatcherState::Closed {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
        assert!(source.is_closed());
        assert_eq!(dispatcher.close().await.unwrap_err(), DispatcherError::Closed);
    }

    #[tokio::test]
    async fn test_dropping_every_handle_stops_loop() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        let mut a = dispatcher.register("a").await.unwrap();
        let clone = dispatcher.clone();
        drop(dispatcher);
        drop(clone);

        assert_eq!(timeout(Duration::from_secs(1), a.recv()).await.unwrap(), None);
        for _ in 0..200 {
            if source.is_closed() {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(source.is_closed());
    }

    #[tokio::test]
    async fn test_ping_forwards_to_source() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        dispatcher.ping().await.unwrap();
        assert_eq!(source.probe_count(), 1);

        source.update_config(|c| c.fail_probe = true);
        assert!(matches!(
            dispatcher.ping().await,
            Err(DispatcherError::Source(SourceError::Connection { .. }))
        ));
        assert_eq!(dispatcher.metrics().probe_failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_broadcast_within_interval() {
        let (source, handle, events) = MockNotificationSource::with_defaults();
        let dispatcher = DispatcherBuilder::new(source, events)
            .keepalive_interval(Some(Duration::from_millis(100)))
            .broadcast_on_timeout(true)
            .build();
        let mut a = dispatcher.register("a").await.unwrap();

        sleep(Duration::from_millis(90)).await;
        assert_eq!(a.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(handle.probe_count(), 0);

        sleep(Duration::from_millis(110)).await;
        assert_eq!(a.try_recv(), Ok(Condition::Resync));
        assert!(handle.probe_count() >= 1);
        assert!(dispatcher.metrics().keepalive_count >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_without_broadcast_only_probes() {
        let (source, handle, events) = MockNotificationSource::with_defaults();
        let dispatcher = DispatcherBuilder::new(source, events)
            .keepalive_interval(Some(Duration::from_millis(100)))
            .build();
        let mut a = dispatcher.register("a").await.unwrap();

        sleep(Duration::from_millis(350)).await;
        assert_eq!(a.try_recv(), Err(TryRecvError::Empty));
        assert!(handle.probe_count() >= 3);

        dispatcher.set_broadcast_on_timeout(true);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(a.try_recv(), Ok(Condition::Resync));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_keepalive_interval_arms_and_disarms() {
        let (dispatcher, source) = setup(MockSourceConfig::default());
        assert_eq!(dispatcher.keepalive_interval(), None);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(source.probe_count(), 0);

        dispatcher.set_keepalive_interval(Some(Duration::from_millis(50)));
        sleep(Duration::from_millis(120)).await;
        assert!(source.probe_count() >= 1);

        dispatcher.set_keepalive_interval(None);
        sleep(Duration::from_millis(10)).await;
        let probes = source.probe_count();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(source.probe_count(), probes);

        // Zero would spin the loop, so it disarms instead
        dispatcher.set_keepalive_interval(Some(Duration::ZERO));
        assert_eq!(dispatcher.keepalive_interval(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_does_not_stall_delivery() {
        let config = MockSourceConfig {
            hang_probe: true,
            ..Default::default()
        };
        let (source, handle, events) = MockNotificationSource::new(config);
        let dispatcher = DispatcherBuilder::new(source, events)
            .keepalive_interval(Some(Duration::from_millis(20)))
            .build();
        let mut a = dispatcher.register("a").await.unwrap();

        sleep(Duration::from_millis(50)).await;
        assert!(handle.probe_count() >= 1);

        handle.notify("a", "after probe").await;
        let condition = timeout(Duration::from_secs(1), a.recv()).await.unwrap();
        assert!(condition.is_some());
        dispatcher.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failures_are_counted() {
        let (source, handle, events) = MockNotificationSource::with_defaults();
        handle.update_config(|c| c.fail_probe = true);
        let dispatcher = DispatcherBuilder::new(source, events)
            .keepalive_interval(Some(Duration::from_millis(100)))
            .build();

        sleep(Duration::from_millis(150)).await;
        assert!(dispatcher.metrics().probe_failure_count >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_lifecycle_calls_report_busy() {
        let config = MockSourceConfig::default().with_latency(Duration::from_millis(100));
        let (dispatcher, _source) = setup(config);

        let registering = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.register("orders").await })
        };
        sleep(Duration::from_millis(10)).await;

        assert_eq!(
            dispatcher.deregister("orders").await.unwrap_err(),
            DispatcherError::topic_busy("orders")
        );
        assert_eq!(
            dispatcher.register("orders").await.unwrap_err(),
            DispatcherError::topic_busy("orders")
        );

        assert!(registering.await.unwrap().is_ok());
        dispatcher.deregister("orders").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_during_register_round_trip_is_kept() {
        let config = MockSourceConfig::default().with_latency(Duration::from_millis(100));
        let (dispatcher, source) = setup(config);

        let registering = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.register("orders").await })
        };
        sleep(Duration::from_millis(10)).await;
        source.notify("orders", "early").await;

        let mut channel = registering.await.unwrap().unwrap();
        assert_eq!(
            channel.try_recv().unwrap().notification().unwrap().payload,
            "early"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_racing_close_does_not_fault() {
        let config = MockSourceConfig::default().with_latency(Duration::from_millis(100));
        let (dispatcher, _source) = setup(config);

        let registering = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.register("orders").await })
        };
        sleep(Duration::from_millis(10)).await;
        dispatcher.close().await.unwrap();

        let result = registering.await.unwrap();
        assert_eq!(
            result.unwrap_err(),
            DispatcherError::Source(SourceError::Closed)
        );
        assert!(dispatcher.registered_topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_register_leaves_topic_reusable() {
        let config = MockSourceConfig::default().with_latency(Duration::from_millis(100));
        let (dispatcher, source) = setup(config);

        let cancelled = timeout(Duration::from_millis(10), dispatcher.register("orders")).await;
        assert!(cancelled.is_err());

        assert!(!dispatcher.is_registered("orders"));
        assert_eq!(dispatcher.metrics().registered, 0);
        assert!(!source.is_subscribed("orders"));

        source.update_config(|c| c.latency = Duration::ZERO);
        let first = dispatcher.register("orders").await.unwrap();
        assert!(source.is_subscribed("orders"));
        dispatcher.deregister("orders").await.unwrap();
        assert!(first.is_closed());
        assert!(dispatcher.register("orders").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_close_still_closes_source() {
        let config = MockSourceConfig::default().with_close_latency(Duration::from_millis(100));
        let (dispatcher, source) = setup(config);
        let mut orders = dispatcher.register("orders").await.unwrap();

        let cancelled = timeout(Duration::from_millis(10), dispatcher.close()).await;
        assert!(cancelled.is_err());
        assert!(orders.recv().await.is_none());

        sleep(Duration::from_millis(200)).await;
        assert!(source.is_closed());
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
        assert_eq!(dispatcher.close().await, Err(DispatcherError::Closed));
    }

    #[tokio::test]
    async fn test_with_settings() {
        let (source, _handle, events) = MockNotificationSource::with_defaults();
        let settings = DispatcherSettings {
            keepalive_interval_ms: Some(250),
            broadcast_on_timeout: true,
        };
        let dispatcher = DispatcherBuilder::new(source, events)
            .with_settings(&settings)
            .build();

        assert_eq!(dispatcher.keepalive_interval(), Some(Duration::from_millis(250)));
        assert!(dispatcher.broadcast_on_timeout());
        assert_eq!(dispatcher.state(), DispatcherState::Open);
    }
}
