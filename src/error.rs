//! Error types for biostream

use crate::io::Format;
use thiserror::Error;

/// Result type alias for biostream operations
pub type Result<T> = std::result::Result<T, BiostreamError>;

/// Error types that can occur in biostream
#[derive(Debug, Error)]
pub enum BiostreamError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required argument was missing or unusable
    ///
    /// Reported synchronously by the call that received the bad argument,
    /// before any I/O is attempted.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bytes do not conform to the format the decoder was committed to
    #[error("{format} decode error: {msg}")]
    Decode {
        /// Format the decoder was configured for
        format: Format,
        /// Decoder diagnostic
        msg: String,
    },
}
