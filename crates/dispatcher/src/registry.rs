//! Registry - the topic map and lifecycle state behind one mutex
//!
//! API calls and the control loop take the lock only briefly; no source
//! round-trip ever happens while it is held.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{Condition, Notification, Topic};
use tracing::debug;

use crate::channel::{ConditionSender, Delivery};
use crate::error::DispatcherError;
use crate::metrics::DispatcherMetrics;

/// Dispatcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Accepting every API call
    Open,
    /// Shutdown started; channels are being or have been closed
    Closing,
    /// Every channel is closed and the source reported closed
    Closed,
}

/// Mutable state shared by the API handles and the control loop
#[derive(Debug)]
pub(crate) struct Registry {
    state: DispatcherState,
    topics: HashMap<Topic, ConditionSender>,
    /// Topics with a source round-trip in progress
    in_flight: HashSet<Topic>,
    broadcast_on_timeout: bool,
    next_id: u64,
}

pub(crate) type SharedRegistry = Arc<Mutex<Registry>>;

/// Lock the registry, ignoring poisoning
///
/// A panic while holding the lock can only come from the map-consistency
/// assertion, which is fatal anyway.
pub(crate) fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    pub(crate) fn new(broadcast_on_timeout: bool) -> Self {
        Self {
            state: DispatcherState::Open,
            topics: HashMap::new(),
            in_flight: HashSet::new(),
            broadcast_on_timeout,
            next_id: 0,
        }
    }

    pub(crate) fn state(&self) -> DispatcherState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: DispatcherState) {
        self.state = state;
    }

    pub(crate) fn ensure_open(&self) -> Result<(), DispatcherError> {
        match self.state {
            DispatcherState::Open => Ok(()),
            _ => Err(DispatcherError::Closed),
        }
    }

    pub(crate) fn broadcast_on_timeout(&self) -> bool {
        self.broadcast_on_timeout
    }

    pub(crate) fn set_broadcast_on_timeout(&mut self, enabled: bool) {
        self.broadcast_on_timeout = enabled;
    }

    pub(crate) fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub(crate) fn len(&self) -> usize {
        self.topics.len()
    }

    pub(crate) fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<_> = self.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Registration id of the live subscription for `topic`
    pub(crate) fn registration_id(&self, topic: &str) -> Option<u64> {
        self.topics.get(topic).map(ConditionSender::id)
    }

    pub(crate) fn insert(&mut self, topic: Topic, sender: ConditionSender) {
        self.topics.insert(topic, sender);
    }

    /// Remove the mapping created by registration `id`
    ///
    /// # Panics
    /// If the map has no entry for `topic`, or the entry belongs to another
    /// registration. Either means two lifecycle calls raced on one topic.
    pub(crate) fn remove_checked(&mut self, topic: &str, id: u64) -> ConditionSender {
        match self.topics.remove(topic) {
            Some(sender) if sender.id() == id => sender,
            Some(sender) => panic!(
                "unexpected registration {} for topic {topic}; expected {id}",
                sender.id()
            ),
            None => panic!("topic {topic} missing from dispatcher map during removal"),
        }
    }

    /// Mark a topic as having a source round-trip in progress
    ///
    /// Returns false if one is already in progress.
    pub(crate) fn begin_in_flight(&mut self, topic: &str) -> bool {
        self.in_flight.insert(topic.to_string())
    }

    pub(crate) fn end_in_flight(&mut self, topic: &str) {
        self.in_flight.remove(topic);
    }

    pub(crate) fn is_in_flight(&self, topic: &str) -> bool {
        self.in_flight.contains(topic)
    }

    /// Offer a notification to its topic's channel, if registered
    pub(crate) fn notify(
        &self,
        notification: Notification,
        metrics: &Arc<DispatcherMetrics>,
    ) -> Option<Delivery> {
        match self.topics.get(&notification.topic) {
            Some(sender) => Some(sender.offer(Condition::Notify(notification), metrics)),
            None => {
                metrics.inc_unroutable_count();
                observability::record_notification_unroutable();
                debug!(topic = %notification.topic, "Notification for unregistered topic");
                None
            }
        }
    }

    /// Offer a resync marker to every registered channel
    ///
    /// Returns how many channels were offered the marker.
    pub(crate) fn broadcast(&self, metrics: &Arc<DispatcherMetrics>) -> usize {
        for sender in self.topics.values() {
            sender.offer(Condition::Resync, metrics);
        }
        metrics.inc_broadcast_count();
        observability::record_resync_broadcast(self.topics.len());
        self.topics.len()
    }

    /// Enter CLOSING and close every remaining channel
    ///
    /// Returns the number of channels closed. Calling it again is harmless;
    /// the map is already empty.
    pub(crate) fn drain(&mut self) -> usize {
        if self.state == DispatcherState::Open {
            self.state = DispatcherState::Closing;
        }
        let senders = std::mem::take(&mut self.topics);
        let count = senders.len();
        // Dropping the senders closes the channels
        drop(senders);
        count
    }
}

/// Clears a topic's in-flight mark when the round-trip finishes, even on panic
///
/// A guard created by `registering` also owns the speculative mapping: unless
/// `disarm` is called, dropping it removes that registration again. This
/// covers a `register` future that is cancelled mid round-trip as well as one
/// the source refused.
pub(crate) struct InFlightGuard {
    registry: SharedRegistry,
    metrics: Arc<DispatcherMetrics>,
    topic: Topic,
    rollback: Option<u64>,
}

impl InFlightGuard {
    pub(crate) fn new(
        registry: SharedRegistry,
        metrics: Arc<DispatcherMetrics>,
        topic: Topic,
    ) -> Self {
        Self {
            registry,
            metrics,
            topic,
            rollback: None,
        }
    }

    /// Guard for registration `id`, rolled back on drop until disarmed
    pub(crate) fn registering(
        registry: SharedRegistry,
        metrics: Arc<DispatcherMetrics>,
        topic: Topic,
        id: u64,
    ) -> Self {
        let mut guard = Self::new(registry, metrics, topic);
        guard.rollback = Some(id);
        guard
    }

    /// Keep the mapping; the registration completed
    pub(crate) fn disarm(&mut self) {
        self.rollback = None;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        registry.end_in_flight(&self.topic);

        let Some(id) = self.rollback else {
            return;
        };
        // Shutdown may have drained the map during the round-trip
        if registry.state() != DispatcherState::Open {
            return;
        }
        if std::thread::panicking() {
            // Never escalate an unwinding panic into an abort
            if registry.registration_id(&self.topic) == Some(id) {
                registry.topics.remove(&self.topic);
            }
        } else {
            drop(registry.remove_checked(&self.topic, id));
        }
        self.metrics.set_registered(registry.len());
        debug!(topic = %self.topic, "Registration rolled back");
    }
}
