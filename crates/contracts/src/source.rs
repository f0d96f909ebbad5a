//! NotificationSource trait - the connection the dispatcher sits on
//!
//! A source owns one logical connection to the database. It handles wire
//! framing, session negotiation and reconnects; the dispatcher only asks it
//! to start or stop topics, probe liveness and close.
//!
//! The inbound event sequence is handed to the dispatcher separately as a
//! channel receiver; its closure means the source stopped producing events.

use crate::SourceError;

/// Notification source trait
///
/// All methods take `&self` so the dispatcher can run a probe concurrently
/// with registration round-trips. Implementations shared that way must also
/// be `Sync`.
#[trait_variant::make(NotificationSource: Send)]
pub trait LocalNotificationSource {
    /// Start receiving notifications for `topic`
    ///
    /// # Errors
    /// `SourceError::AlreadySubscribed` if the topic is live, or any
    /// connection failure
    async fn begin_topic(&self, topic: &str) -> Result<(), SourceError>;

    /// Stop receiving notifications for `topic`
    ///
    /// # Errors
    /// `SourceError::NotSubscribed` if the topic is not live, or any
    /// connection failure
    async fn end_topic(&self, topic: &str) -> Result<(), SourceError>;

    /// Liveness check against the backend
    async fn probe(&self) -> Result<(), SourceError>;

    /// Close the connection and end the event sequence
    async fn close(&self) -> Result<(), SourceError>;
}
