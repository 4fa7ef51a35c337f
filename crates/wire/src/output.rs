//! Response and output types

use crate::error::WireError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single response frame: exactly one per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Command succeeded
    Ok(Output),
    /// Command failed; the connection stays usable
    Err(WireError),
}

/// Successful command results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Output {
    /// Reply to `Ping`
    Pong,
    /// Command completed with nothing to return
    Unit,
    /// Reply to `Hello`
    Hello {
        /// Shard rank
        rank: u32,
        /// Number of shards in the workspace
        total_shards: u32,
        /// Wire protocol version spoken by the shard
        protocol_version: u32,
        /// Id assigned to this connection
        client_id: u64,
    },
    /// Reply to `Schema`
    Schema(SchemaInfo),
    /// Reply to `Status`
    Status(StatusInfo),
    /// Schema revision after a maintenance command reloaded the shard
    Revision(u32),
    /// Id of an inserted document
    DocId(u64),
    /// A document body
    Document(Value),
    /// A document count
    Count(u64),
    /// Ids matching an index lookup
    DocIds(Vec<u64>),
}

/// Snapshot of a shard's schema
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Schema revision
    pub revision: u32,
    /// Collection name to its indexed paths
    pub collections: BTreeMap<String, Vec<String>>,
}

/// Snapshot of a shard's coordination state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Shard rank
    pub rank: u32,
    /// Number of shards in the workspace
    pub total_shards: u32,
    /// Current schema revision
    pub revision: u32,
    /// Transactions currently holding a slot
    pub pending_transactions: i64,
    /// Worker holding the maintenance lock, 0 if none
    pub maintenance_owner: u64,
    /// Connections currently being served
    pub live_workers: u64,
    /// Whether the shard has stopped accepting connections
    pub shutting_down: bool,
}
