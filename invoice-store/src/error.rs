//! Error types for the invoice store

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Store errors
#[derive(Error, Debug)]
pub enum Error {
    /// Key has the wrong length
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No record under the key
    #[error("Invoice not found")]
    NotFound,

    /// Key already written, or the content is already stored
    #[error("Invoice already exists")]
    AlreadyExists,

    /// Backend unavailable or failed (RocksDB, lock timeout, ...)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored record could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<history_model::Error> for Error {
    fn from(err: history_model::Error) -> Self {
        match err {
            history_model::Error::InvalidArgument(msg) => Error::InvalidArgument(msg),
            other => Error::Serialization(other.to_string()),
        }
    }
}
