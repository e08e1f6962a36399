//! Error types for webhook events

use crate::{app::AppConfigError, webhook::WebhookError};
use message_bus::HandlerError;
use thiserror::Error;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Processor errors
#[derive(Error, Debug)]
pub enum Error {
    /// Entry could not be decoded, hashed or inspected
    #[error("Model error: {0}")]
    Model(#[from] history_model::Error),

    /// Invoice lookup failed
    #[error("Invoice store error: {0}")]
    InvoiceStore(#[from] invoice_store::Error),

    /// App config lookup failed
    #[error("App config error: {0}")]
    AppConfig(#[from] AppConfigError),

    /// Webhook call failed
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Enqueue failed
    #[error("Queue error: {0}")]
    Queue(#[from] message_bus::Error),

    /// Task type tag is not an entry
    #[error("Unsupported message type: {0}")]
    UnsupportedMessage(String),

    /// Event body could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether redelivering the task may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::InvoiceStore(e) => e.is_transient(),
            Error::AppConfig(_) => true,
            Error::Webhook(e) => e.is_transient(),
            Error::Queue(_) => true,
            Error::Io(_) => true,
            Error::Model(_)
            | Error::UnsupportedMessage(_)
            | Error::Serialization(_)
            | Error::Config(_) => false,
        }
    }
}

impl From<Error> for HandlerError {
    fn from(err: Error) -> Self {
        if err.is_transient() {
            HandlerError::Transient(err.to_string())
        } else {
            HandlerError::Permanent(err.to_string())
        }
    }
}
