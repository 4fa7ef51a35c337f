//! Shared test utilities for the shard integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
pub use strata_shard::{ShardClient, ShardConfig, ShardError, ShardResult, ShardServer};
pub use strata_wire::{Command, ErrorCode, Output, Request, Response};
use tempfile::TempDir;

// ============================================================================
// TestShard - server running on a background thread
// ============================================================================

/// A shard server serving from a temporary workspace.
pub struct TestShard {
    pub server: Arc<ShardServer>,
    pub dir: TempDir,
    handle: Option<JoinHandle<ShardResult<()>>>,
}

impl TestShard {
    /// Start rank 0 of 1 with default configuration.
    pub fn start() -> Self {
        Self::start_with(ShardConfig::default())
    }

    /// Start rank 0 of 1 with the given configuration.
    pub fn start_with(config: ShardConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        Self::start_in(dir, 0, 1, config)
    }

    /// Start a server in an existing workspace.
    pub fn start_in(dir: TempDir, rank: u32, total_shards: u32, config: ShardConfig) -> Self {
        let server = Arc::new(ShardServer::with_config(
            rank,
            total_shards,
            dir.path(),
            config,
        ));
        let handle = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.run())
        };
        let shard = Self {
            server,
            dir,
            handle: Some(handle),
        };
        shard.wait_for_socket();
        shard
    }

    fn wait_for_socket(&self) {
        let path = self.server.socket_path().to_path_buf();
        let probe = |path: &Path| {
            ShardClient::connect(path)
                .and_then(|mut client| client.execute(Command::Ping))
                .is_ok()
        };
        assert!(
            wait_until(Duration::from_secs(5), || probe(&path)),
            "server never started listening on {}",
            path.display()
        );
        // The probe's worker was registered before it answered; wait for it to exit
        assert!(wait_until(Duration::from_secs(5), || self.server.live_workers() == 0));
    }

    /// Open a client connection.
    pub fn connect(&self) -> ShardClient {
        ShardClient::connect(self.server.socket_path()).expect("Failed to connect")
    }

    /// Open a raw socket, bypassing the client.
    pub fn connect_raw(&self) -> UnixStream {
        UnixStream::connect(self.server.socket_path()).expect("Failed to connect")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.server.socket_path().to_path_buf()
    }

    /// Shut down and return what `run` returned.
    pub fn stop(&mut self) -> ShardResult<()> {
        self.server.shutdown();
        self.join()
    }

    /// Wait for `run` to return without calling shutdown.
    pub fn join(&mut self) -> ShardResult<()> {
        match self.handle.take() {
            Some(handle) => handle.join().expect("server thread panicked"),
            None => Ok(()),
        }
    }
}

impl TestShard {
    /// Stop the server, drop every handle it holds, and keep the workspace.
    pub fn into_workspace(mut self) -> TempDir {
        let _ = self.stop();
        assert!(self.server.wait_for_workers(Duration::from_secs(5)));
        std::mem::replace(&mut self.dir, TempDir::new().expect("Failed to create temp dir"))
    }
}

impl Drop for TestShard {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.server.shutdown();
            let _ = self.join();
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Unwrap a remote error code.
pub fn remote_code<T: std::fmt::Debug>(result: ShardResult<T>) -> ErrorCode {
    match result {
        Err(ShardError::Remote(e)) => e.code,
        other => panic!("expected a remote error, got {:?}", other),
    }
}

/// Worker id of a connection.
pub fn client_id(client: &mut ShardClient) -> u64 {
    match client.execute(Command::Hello).expect("hello failed") {
        Output::Hello { client_id, .. } => client_id,
        other => panic!("unexpected output: {:?}", other),
    }
}

/// Current schema revision as seen by a client.
pub fn revision(client: &mut ShardClient) -> u32 {
    match client.execute(Command::Schema).expect("schema failed") {
        Output::Schema(info) => info.revision,
        other => panic!("unexpected output: {:?}", other),
    }
}

/// Create a collection through the one-shot maintenance path.
pub fn create_collection(client: &mut ShardClient, name: &str) -> u32 {
    match client
        .execute(Command::CollectionCreate { name: name.into() })
        .expect("create collection failed")
    {
        Output::Revision(revision) => revision,
        other => panic!("unexpected output: {:?}", other),
    }
}

pub fn insert(client: &mut ShardClient, collection: &str, doc: serde_json::Value) -> ShardResult<u64> {
    match client.execute(Command::DocInsert {
        collection: collection.into(),
        doc,
    })? {
        Output::DocId(id) => Ok(id),
        other => panic!("unexpected output: {:?}", other),
    }
}

pub fn count(client: &mut ShardClient, collection: &str) -> u64 {
    match client
        .execute(Command::DocCount {
            collection: collection.into(),
        })
        .expect("count failed")
    {
        Output::Count(n) => n,
        other => panic!("unexpected output: {:?}", other),
    }
}
