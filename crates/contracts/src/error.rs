//! Layered error definitions
//!
//! Categorized by source: config / source / general

use thiserror::Error;

/// Unified error type for configuration and general failures
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Source Errors =====
    /// Error reported by a notification source
    #[error(transparent)]
    Source(#[from] SourceError),

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration parse error that keeps the underlying cause
    pub fn config_parse_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by a `NotificationSource`
///
/// The dispatcher passes these through verbatim, except for the two
/// subscription-state kinds which it maps onto its own equivalents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The topic already has a live subscription on the connection
    #[error("topic '{topic}' is already subscribed")]
    AlreadySubscribed { topic: String },

    /// The topic has no live subscription on the connection
    #[error("topic '{topic}' is not subscribed")]
    NotSubscribed { topic: String },

    /// Network or session failure
    #[error("source connection error: {message}")]
    Connection { message: String },

    /// The backend answered with something the protocol does not allow
    #[error("source protocol error: {message}")]
    Protocol { message: String },

    /// The source has been closed
    #[error("source is closed")]
    Closed,
}

impl SourceError {
    /// Create connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}
