//! Error types carried on the wire and raised by the codec
//!
//! [`WireError`] is what a shard sends back when a command fails. Errors are:
//! - **Structured**: a stable [`ErrorCode`] plus a human-readable message
//! - **Serializable**: they travel inside a [`crate::Response`]
//!
//! [`CodecError`] covers framing failures; it never crosses the wire, it ends
//! the connection.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Stable error codes
///
/// | Category | Codes |
/// |----------|-------|
/// | Contention (retryable) | `MaintenanceInProgress`, `SchemaChanged`, `Busy` |
/// | Session state | `TransactionActive`, `TransactionNotActive`, `MaintenanceNotHeld` |
/// | Not found / exists | `CollectionNotFound`, `CollectionExists`, `DocumentNotFound`, `IndexNotFound`, `IndexExists` |
/// | Validation | `InvalidInput` |
/// | System | `Storage`, `Internal` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Another connection holds the maintenance lock
    MaintenanceInProgress,
    /// Client schema revision is stale
    SchemaChanged,
    /// Pending transactions did not drain in time
    Busy,
    /// This connection already holds a transaction
    TransactionActive,
    /// This connection holds no transaction
    TransactionNotActive,
    /// This connection does not hold the maintenance lock
    MaintenanceNotHeld,
    /// Collection does not exist
    CollectionNotFound,
    /// Collection already exists
    CollectionExists,
    /// Document does not exist
    DocumentNotFound,
    /// Index does not exist
    IndexNotFound,
    /// Index already exists
    IndexExists,
    /// Malformed arguments
    InvalidInput,
    /// Storage engine failure
    Storage,
    /// Unexpected server failure
    Internal,
}

impl ErrorCode {
    /// Whether the client should simply retry later
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::MaintenanceInProgress | ErrorCode::SchemaChanged | ErrorCode::Busy
        )
    }
}

/// Error returned to a client in place of an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct WireError {
    /// Stable machine-readable code
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl WireError {
    /// Build an error from a code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the client should simply retry later
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

/// Framing and payload codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    /// Underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Declared frame length exceeds the configured limit
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Declared payload length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Stream ended inside a frame
    #[error("connection closed mid-frame after {read} of {expected} bytes")]
    Truncated {
        /// Bytes received
        read: usize,
        /// Bytes expected
        expected: usize,
    },

    /// Payload could not be encoded
    #[error("encode error: {0}")]
    Encode(String),

    /// Payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<rmp_serde::encode::Error> for CodecError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CodecError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CodecError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CodecError::Decode(e.to_string())
    }
}
