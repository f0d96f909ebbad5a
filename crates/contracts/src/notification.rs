//! Notification data model
//!
//! What a source emits and what a consumer reads back from its condition channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Topic name
///
/// Opaque to the dispatcher; only the source decides what is a legal name.
pub type Topic = String;

/// Identifier of the backend session that raised a notification
pub type SenderId = u32;

/// A concrete notification delivered on a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Topic the notification was raised on
    pub topic: Topic,
    /// Payload, possibly empty
    #[serde(default)]
    pub payload: String,
    /// Backend session that raised it
    pub sender_id: SenderId,
}

impl Notification {
    /// Create a notification
    pub fn new(topic: impl Into<Topic>, payload: impl Into<String>, sender_id: SenderId) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            sender_id,
        }
    }

    /// Whether the payload is empty
    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} ({} bytes)",
            self.topic,
            self.sender_id,
            self.payload.len()
        )
    }
}

/// One item of a source's inbound event sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A concrete notification for one topic
    Notification(Notification),
    /// Every topic should be treated as possibly changed, e.g. after a reconnect
    Resync,
}

impl From<Notification> for SourceEvent {
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

/// The value a consumer reads from its condition channel
///
/// Presence matters, count does not: any number of events between two
/// reads collapse into a single pending `Condition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Something was raised on this topic since the last read
    Notify(Notification),
    /// The topic may have changed; re-check the database
    Resync,
}

impl Condition {
    /// The notification carried, if any
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Self::Notify(n) => Some(n),
            Self::Resync => None,
        }
    }

    /// Whether this is the resync marker
    pub fn is_resync(&self) -> bool {
        matches!(self, Self::Resync)
    }
}
