//! Shard Server Integration Tests
//!
//! Real servers on temporary workspaces, driven through Unix sockets.

#[path = "../common/mod.rs"]
mod common;

mod lifecycle;
mod maintenance;
