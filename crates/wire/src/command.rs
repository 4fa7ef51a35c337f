//! Command and request types
//!
//! Every request frame carries one [`Request`]: an optional schema revision
//! the client believes is current, and the [`Command`] to run.
//!
//! Commands fall into classes that decide how the shard coordinates them:
//!
//! | Class | Commands |
//! |-------|----------|
//! | Direct | `Ping`, `Hello`, `Schema`, `Status`, `Shutdown` |
//! | Transaction lifecycle | `TxnBegin`, `TxnEnd` |
//! | Data | `DocInsert`, `DocRead`, `DocUpdate`, `DocDelete`, `DocCount`, `IndexLookup` |
//! | Maintenance lifecycle | `MaintBegin`, `MaintEnd` |
//! | Maintenance | `CollectionCreate`, `CollectionDrop`, `CollectionRename`, `IndexCreate`, `IndexDrop` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single request frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Schema revision the client last saw; `None` skips the staleness check
    pub schema_revision: Option<u32>,
    /// Command to execute
    pub command: Command,
}

impl Request {
    /// Request without a schema revision check
    pub fn new(command: Command) -> Self {
        Self {
            schema_revision: None,
            command,
        }
    }

    /// Request that fails with `SchemaChanged` unless the shard is at `revision`
    pub fn at_revision(revision: u32, command: Command) -> Self {
        Self {
            schema_revision: Some(revision),
            command,
        }
    }
}

/// Commands understood by a shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    // ==================== Direct ====================
    /// Liveness check
    Ping,
    /// Identify the shard and this connection
    Hello,
    /// Current schema revision and layout
    Schema,
    /// Coordination counters and lifecycle state
    Status,
    /// Stop accepting new connections
    Shutdown,

    // ==================== Transactions ====================
    /// Open a session transaction on this connection
    TxnBegin,
    /// Close the session transaction on this connection
    TxnEnd,

    // ==================== Data ====================
    /// Insert a document, returning its id
    DocInsert {
        /// Target collection
        collection: String,
        /// JSON object to store
        doc: Value,
    },
    /// Read a document by id
    DocRead {
        /// Target collection
        collection: String,
        /// Document id
        id: u64,
    },
    /// Replace a document by id
    DocUpdate {
        /// Target collection
        collection: String,
        /// Document id
        id: u64,
        /// Replacement JSON object
        doc: Value,
    },
    /// Delete a document by id
    DocDelete {
        /// Target collection
        collection: String,
        /// Document id
        id: u64,
    },
    /// Count documents in a collection
    DocCount {
        /// Target collection
        collection: String,
    },
    /// Find ids by indexed value
    IndexLookup {
        /// Target collection
        collection: String,
        /// Dotted index path
        path: String,
        /// Value to match
        value: Value,
    },

    // ==================== Maintenance ====================
    /// Claim the maintenance lock for a multi-command session
    MaintBegin,
    /// Release the maintenance lock
    MaintEnd,
    /// Create a collection
    CollectionCreate {
        /// New collection name
        name: String,
    },
    /// Drop a collection
    CollectionDrop {
        /// Collection to drop
        name: String,
    },
    /// Rename a collection
    CollectionRename {
        /// Current name
        from: String,
        /// New name
        to: String,
    },
    /// Create an index on a dotted path
    IndexCreate {
        /// Target collection
        collection: String,
        /// Dotted path to index
        path: String,
    },
    /// Drop the index on a dotted path
    IndexDrop {
        /// Target collection
        collection: String,
        /// Dotted path of the index
        path: String,
    },
}

/// How the shard coordinates a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Runs without coordination
    Direct,
    /// `TxnBegin` / `TxnEnd`
    TransactionLifecycle,
    /// Needs a transaction slot (explicit or implicit)
    Data,
    /// `MaintBegin` / `MaintEnd`
    MaintenanceLifecycle,
    /// Needs the maintenance lock and triggers a reload
    Maintenance,
}

impl Command {
    /// Coordination class of this command
    pub fn class(&self) -> CommandClass {
        match self {
            Command::Ping
            | Command::Hello
            | Command::Schema
            | Command::Status
            | Command::Shutdown => CommandClass::Direct,
            Command::TxnBegin | Command::TxnEnd => CommandClass::TransactionLifecycle,
            Command::DocInsert { .. }
            | Command::DocRead { .. }
            | Command::DocUpdate { .. }
            | Command::DocDelete { .. }
            | Command::DocCount { .. }
            | Command::IndexLookup { .. } => CommandClass::Data,
            Command::MaintBegin | Command::MaintEnd => CommandClass::MaintenanceLifecycle,
            Command::CollectionCreate { .. }
            | Command::CollectionDrop { .. }
            | Command::CollectionRename { .. }
            | Command::IndexCreate { .. }
            | Command::IndexDrop { .. } => CommandClass::Maintenance,
        }
    }

    /// Short operation name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Hello => "hello",
            Command::Schema => "schema",
            Command::Status => "status",
            Command::Shutdown => "shutdown",
            Command::TxnBegin => "txn.begin",
            Command::TxnEnd => "txn.end",
            Command::DocInsert { .. } => "doc.insert",
            Command::DocRead { .. } => "doc.read",
            Command::DocUpdate { .. } => "doc.update",
            Command::DocDelete { .. } => "doc.delete",
            Command::DocCount { .. } => "doc.count",
            Command::IndexLookup { .. } => "index.lookup",
            Command::MaintBegin => "maint.begin",
            Command::MaintEnd => "maint.end",
            Command::CollectionCreate { .. } => "collection.create",
            Command::CollectionDrop { .. } => "collection.drop",
            Command::CollectionRename { .. } => "collection.rename",
            Command::IndexCreate { .. } => "index.create",
            Command::IndexDrop { .. } => "index.drop",
        }
    }
}
