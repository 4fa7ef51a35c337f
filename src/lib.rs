//! Strata sharding: shard server, wire protocol, and embedded document store
//!
//! Re-exports the workspace crates under one roof:
//! - [`shard`]: server, per-connection workers, coordination, client
//! - [`wire`]: request/response framing
//! - [`docstore`]: storage engine each shard serves from

pub use strata_docstore as docstore;
pub use strata_shard as shard;
pub use strata_wire as wire;

pub use strata_shard::{ShardClient, ShardConfig, ShardError, ShardServer};
