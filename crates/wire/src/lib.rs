//! Wire protocol for Strata shards
//!
//! Defines the contract between a shard server and its callers (router,
//! tools, tests):
//! - Framing: `[u32 BE length][MessagePack payload]`
//! - Request: `{schema_revision, command}`
//! - Response: exactly one `Ok(output)` or `Err(error)` per request, in order
//!
//! The contract is versioned by [`PROTOCOL_VERSION`]; any change to the
//! command or output enums that is not backward compatible bumps it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod frame;
pub mod output;

pub use command::{Command, CommandClass, Request};
pub use error::{CodecError, ErrorCode, WireError};
pub use frame::{
    read_frame, read_message, write_frame, write_message, DEFAULT_MAX_FRAME_BYTES,
    FRAME_HEADER_LEN,
};
pub use output::{Output, Response, SchemaInfo, StatusInfo};

/// Version of the request/response contract
pub const PROTOCOL_VERSION: u32 = 1;
