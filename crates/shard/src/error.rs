//! Error types for the shard server
//!
//! Categories follow how far an error is allowed to travel:
//!
//! | Category | Variants | Effect |
//! |----------|----------|--------|
//! | Startup | `Bind`, `Open`, `Config` | `run()` returns it, nothing is served |
//! | Contention | `MaintenanceInProgress`, `DrainTimeout`, `SchemaChanged` | retryable response to one client |
//! | Session | `TransactionActive`, `TransactionNotActive`, `MaintenanceNotHeld` | error response to one client |
//! | Connection | `Codec`, `Io` | ends one worker |
//! | Client side | `Remote`, `Protocol` | raised by [`crate::ShardClient`] |

use std::io;
use std::path::PathBuf;
use strata_docstore::DocError;
use strata_wire::{CodecError, ErrorCode, WireError};
use thiserror::Error;

/// Result type alias for shard operations
pub type ShardResult<T> = std::result::Result<T, ShardError>;

/// Error types for the shard server
#[derive(Debug, Error)]
pub enum ShardError {
    /// Listening socket could not be bound
    #[error("failed to bind {path}: {source}")]
    Bind {
        /// Socket path
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// Database could not be opened during reload
    #[error("failed to open database at {path}: {source}")]
    Open {
        /// Database directory
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: DocError,
    },

    /// Configuration could not be read or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Another worker holds the maintenance lock
    #[error("maintenance in progress (held by client {owner})")]
    MaintenanceInProgress {
        /// Current lock owner
        owner: u64,
    },

    /// Pending transactions did not drain before the deadline
    #[error("timed out waiting for {pending} pending transactions to finish")]
    DrainTimeout {
        /// Transactions still pending at the deadline
        pending: i64,
    },

    /// Client's schema revision is stale
    #[error("schema changed: client at revision {client}, shard at {current}")]
    SchemaChanged {
        /// Revision the client sent
        client: u32,
        /// Revision the shard is at
        current: u32,
    },

    /// Connection already holds a transaction
    #[error("a transaction is already active on this connection")]
    TransactionActive,

    /// Connection holds no transaction
    #[error("no transaction is active on this connection")]
    TransactionNotActive,

    /// Connection does not hold the maintenance lock
    #[error("this connection does not hold the maintenance lock")]
    MaintenanceNotHeld,

    /// Server has no open database handle
    #[error("database is not loaded")]
    NotLoaded,

    /// Storage engine error
    #[error(transparent)]
    Storage(#[from] DocError),

    /// Framing or payload codec error
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Shard answered with an error
    #[error("shard error: {0}")]
    Remote(WireError),

    /// Shard broke the request/response contract
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ShardError {
    /// Stable wire code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            ShardError::MaintenanceInProgress { .. } => ErrorCode::MaintenanceInProgress,
            ShardError::DrainTimeout { .. } => ErrorCode::Busy,
            ShardError::SchemaChanged { .. } => ErrorCode::SchemaChanged,
            ShardError::TransactionActive => ErrorCode::TransactionActive,
            ShardError::TransactionNotActive => ErrorCode::TransactionNotActive,
            ShardError::MaintenanceNotHeld => ErrorCode::MaintenanceNotHeld,
            ShardError::Storage(e) => match e {
                DocError::CollectionNotFound(_) => ErrorCode::CollectionNotFound,
                DocError::CollectionExists(_) => ErrorCode::CollectionExists,
                DocError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
                DocError::IndexNotFound { .. } => ErrorCode::IndexNotFound,
                DocError::IndexExists { .. } => ErrorCode::IndexExists,
                DocError::InvalidInput(_) => ErrorCode::InvalidInput,
                _ => ErrorCode::Storage,
            },
            ShardError::Remote(e) => e.code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the client should simply retry later
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Convert to the error sent back to a client
    pub fn to_wire(&self) -> WireError {
        match self {
            ShardError::Remote(e) => e.clone(),
            other => WireError::new(other.code(), other.to_string()),
        }
    }
}
