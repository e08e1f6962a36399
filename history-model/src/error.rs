//! Error types for the history model

use thiserror::Error;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Model errors
#[derive(Error, Debug)]
pub enum Error {
    /// Pointer has a wrong length or an unknown version tag
    #[error("Invalid pointer: {0}")]
    InvalidPointer(String),

    /// Cursor is not a decimal paging token
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Argument has the wrong shape (key lengths, memo fields)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialized payload could not be decoded
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Unknown version or entry variant
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}

impl From<stellar_xdr::curr::Error> for Error {
    fn from(err: stellar_xdr::curr::Error) -> Self {
        Error::Malformed(format!("xdr: {}", err))
    }
}
