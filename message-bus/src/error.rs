//! Error types for message bus

use thiserror::Error;

/// Message bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(String),

    /// Subscribe error
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Stream or consumer setup failed
    #[error("JetStream error: {0}")]
    JetStream(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Queue no longer accepts messages
    #[error("Queue closed")]
    Closed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a failed delivery, as reported by a handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Retry later with backoff
    #[error("transient: {0}")]
    Transient(String),

    /// Never retry; dead-letter now
    #[error("permanent: {0}")]
    Permanent(String),
}

impl HandlerError {
    /// Whether the message is eligible for redelivery
    pub fn is_transient(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }

    /// Failure reason
    pub fn reason(&self) -> &str {
        match self {
            HandlerError::Transient(reason) | HandlerError::Permanent(reason) => reason,
        }
    }
}
