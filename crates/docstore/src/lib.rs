//! Embedded document store for Strata shards
//!
//! This crate provides the storage engine a shard serves from:
//! - DocDb: directory-backed database handle with open/close
//! - Collections of JSON object documents keyed by random `u64` ids
//! - Hash indexes on dotted paths, rebuilt on open
//! - Metadata introspection (collections, index paths) for schema mirrors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collection;
pub mod db;
pub mod error;
pub mod index;

pub use collection::{DOCS_FILE, INDEXES_FILE};
pub use db::DocDb;
pub use error::{DocError, DocResult};
pub use index::IndexPath;
