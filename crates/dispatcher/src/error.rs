//! Dispatcher error types

use contracts::{SourceError, Topic};
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatcherError {
    /// The dispatcher is shutting down or has shut down
    #[error("dispatcher has been closed")]
    Closed,

    /// The topic already has a live subscription
    #[error("topic '{topic}' is already registered")]
    AlreadyRegistered { topic: Topic },

    /// The topic has no live subscription
    #[error("topic '{topic}' is not registered")]
    NotRegistered { topic: Topic },

    /// Another register/deregister for the topic is still talking to the source
    #[error("topic '{topic}' has a registration change in progress")]
    TopicBusy { topic: Topic },

    /// Error passed through from the notification source
    #[error("source error: {0}")]
    Source(SourceError),
}

impl DispatcherError {
    /// Create already-registered error
    pub fn already_registered(topic: impl Into<Topic>) -> Self {
        Self::AlreadyRegistered {
            topic: topic.into(),
        }
    }

    /// Create not-registered error
    pub fn not_registered(topic: impl Into<Topic>) -> Self {
        Self::NotRegistered {
            topic: topic.into(),
        }
    }

    /// Create topic-busy error
    pub fn topic_busy(topic: impl Into<Topic>) -> Self {
        Self::TopicBusy {
            topic: topic.into(),
        }
    }
}

impl From<SourceError> for DispatcherError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::AlreadySubscribed { topic } => Self::AlreadyRegistered { topic },
            SourceError::NotSubscribed { topic } => Self::NotRegistered { topic },
            other => Self::Source(other),
        }
    }
}
