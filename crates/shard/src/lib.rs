//! Strata shard server
//!
//! Serves one rank of a sharded document database over a Unix socket:
//! - ShardServer: lifecycle (run/shutdown), reload, coordination state
//! - ShardServerWorker: one thread per connection, request/response loop
//! - AdmissionGate: lock-free transaction admission vs. maintenance exclusion
//! - Schema: revisioned mirror of the collection/index layout
//! - ShardClient: blocking client for the same protocol

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod client;
pub mod config;
pub mod error;
pub mod schema;
pub mod server;
pub mod worker;

pub use admission::{AdmissionGate, NO_OWNER};
pub use client::ShardClient;
pub use config::{ShardConfig, CONFIG_FILE_NAME};
pub use error::{ShardError, ShardResult};
pub use schema::Schema;
pub use server::{socket_path_for, ShardServer, SOCKET_FILE_SUFFIX};
pub use worker::ShardServerWorker;
