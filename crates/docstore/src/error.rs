//! Error types for the document store
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for document store operations
pub type DocResult<T> = std::result::Result<T, DocError>;

/// Error types for the document store
#[derive(Debug, Error)]
pub enum DocError {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Handle was closed; no further operations are accepted
    #[error("Database is closed")]
    Closed,

    /// `close()` was called on a handle that is already closed
    #[error("Database is already closed")]
    AlreadyClosed,

    /// Collection does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Collection name already taken
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Document id not present in the collection
    #[error("Document {id} not found in collection {collection}")]
    DocumentNotFound {
        /// Collection searched
        collection: String,
        /// Missing document id
        id: u64,
    },

    /// No index on the given path
    #[error("Index {path} not found in collection {collection}")]
    IndexNotFound {
        /// Collection searched
        collection: String,
        /// Dotted index path
        path: String,
    },

    /// Index already exists on the given path
    #[error("Index {path} already exists in collection {collection}")]
    IndexExists {
        /// Collection name
        collection: String,
        /// Dotted index path
        path: String,
    },

    /// Invalid name, path, or document shape
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// On-disk data could not be interpreted
    #[error("Corrupt collection {collection}: {reason}")]
    Corruption {
        /// Collection whose files are damaged
        collection: String,
        /// What went wrong
        reason: String,
    },
}

impl From<rmp_serde::encode::Error> for DocError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        DocError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for DocError {
    fn from(e: serde_json::Error) -> Self {
        DocError::Serialization(e.to_string())
    }
}
