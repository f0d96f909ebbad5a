//! Condition channels - capacity-1 coalescing mailboxes, one per topic
//!
//! The dispatcher keeps the sending half in its topic map; the consumer gets
//! the receiving half from `register`. Dropping the sending half is the only
//! way a channel gets closed.

use std::sync::Arc;

use contracts::{Condition, Topic};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::metrics::DispatcherMetrics;

/// Fixed capacity of every condition channel
pub const CONDITION_CAPACITY: usize = 1;

/// Outcome of offering a condition to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The channel was empty and now holds the condition
    Delivered,
    /// The channel already held a pending condition; the new one was dropped
    Coalesced,
    /// The consumer dropped its receiver
    ReceiverGone,
}

/// Sending half owned by the dispatcher's topic map
#[derive(Debug)]
pub(crate) struct ConditionSender {
    /// Identity of this registration, used to check map consistency
    id: u64,
    topic: Topic,
    tx: mpsc::Sender<Condition>,
}

impl ConditionSender {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Offer a condition without blocking
    pub(crate) fn offer(&self, condition: Condition, metrics: &Arc<DispatcherMetrics>) -> Delivery {
        match self.tx.try_send(condition) {
            Ok(()) => {
                metrics.inc_delivered_count();
                observability::record_notification_delivered(&self.topic);
                Delivery::Delivered
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics.inc_coalesced_count();
                observability::record_notification_coalesced(&self.topic);
                trace!(topic = %self.topic, "Condition already pending, coalesced");
                Delivery::Coalesced
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(topic = %self.topic, "Consumer dropped condition channel");
                Delivery::ReceiverGone
            }
        }
    }
}

/// Create a linked sender/receiver pair for one registration
pub(crate) fn condition_channel(id: u64, topic: &str) -> (ConditionSender, ConditionChannel) {
    let (tx, rx) = mpsc::channel(CONDITION_CAPACITY);
    let sender = ConditionSender {
        id,
        topic: topic.to_string(),
        tx,
    };
    let receiver = ConditionChannel {
        topic: topic.to_string(),
        rx,
    };
    (sender, receiver)
}

/// Error returned by `ConditionChannel::try_recv`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
    /// Nothing has happened since the last read
    #[error("no pending condition")]
    Empty,
    /// The topic was deregistered or the dispatcher closed
    #[error("condition channel closed")]
    Closed,
}

/// Consumer side of a topic subscription
///
/// Holds at most one pending `Condition`. A read returning `None` means the
/// topic was deregistered or the dispatcher shut down; there is no other
/// termination signal.
#[derive(Debug)]
pub struct ConditionChannel {
    topic: Topic,
    rx: mpsc::Receiver<Condition>,
}

impl ConditionChannel {
    /// Topic this channel belongs to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait until something happened on the topic
    ///
    /// Returns `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<Condition> {
        self.rx.recv().await
    }

    /// Take the pending condition, if any, without waiting
    pub fn try_recv(&mut self) -> Result<Condition, TryRecvError> {
        self.rx.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => TryRecvError::Empty,
            mpsc::error::TryRecvError::Disconnected => TryRecvError::Closed,
        })
    }

    /// Whether a condition is waiting to be read
    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Whether the dispatcher side is gone
    ///
    /// A pending condition may still be readable after close.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}
