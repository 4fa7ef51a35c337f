//! Shard server: lifecycle and shared coordination state
//!
//! One `ShardServer` exists per rank. It owns:
//! - the embedded database handle and its schema mirror (replaced by `reload`)
//! - the client id sequence and the admission gate (lock-free)
//! - the listener and the shutdown flag (behind `coordination`)
//!
//! ## Lifecycle
//!
//! ```text
//! ShardServer::new()  -- pure, no I/O
//!   run()             -- remove stale socket, reload, bind, accept loop
//!     accept -> spawn ShardServerWorker (fire-and-forget)
//!   shutdown()        -- close listener, set shutting_down; run() returns Ok
//! ```
//!
//! Shutdown does not wait for connected workers. Supervisors that want a
//! bounded drain call `wait_for_workers` afterwards.

use crate::admission::AdmissionGate;
use crate::config::ShardConfig;
use crate::error::{ShardError, ShardResult};
use crate::schema::Schema;
use crate::worker::ShardServerWorker;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::io::ErrorKind;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strata_docstore::{DocDb, DocError};
use strata_wire::StatusInfo;
use tracing::{debug, error, info, warn};

/// Suffix of a rank's Unix socket file
pub const SOCKET_FILE_SUFFIX: &str = "_sock";

/// State guarded by the coordination lock
struct Coordination {
    listener: Option<UnixListener>,
    shutting_down: bool,
}

/// Book-keeping for one live connection
#[derive(Debug, Clone, Copy)]
struct WorkerEntry {
    connected_at: Instant,
}

/// Shard server for one rank
pub struct ShardServer {
    rank: u32,
    total_shards: u32,
    workspace: PathBuf,
    database_path: PathBuf,
    socket_path: PathBuf,
    config: ShardConfig,

    /// Source of worker ids; first id handed out is 1
    client_id_seq: AtomicU64,

    /// Maintenance owner and pending transaction count
    gate: AdmissionGate,

    /// Listener and shutdown flag
    coordination: Mutex<Coordination>,

    /// Current database handle, `None` before the first reload
    database: RwLock<Option<Arc<DocDb>>>,

    /// Current schema snapshot
    schema: RwLock<Arc<Schema>>,

    /// Live workers by id
    workers: DashMap<u64, WorkerEntry>,
}

impl ShardServer {
    /// Create a server with default configuration; does no I/O
    pub fn new(rank: u32, total_shards: u32, workspace: impl Into<PathBuf>) -> Self {
        Self::with_config(rank, total_shards, workspace, ShardConfig::default())
    }

    /// Create a server with explicit configuration; does no I/O
    pub fn with_config(
        rank: u32,
        total_shards: u32,
        workspace: impl Into<PathBuf>,
        config: ShardConfig,
    ) -> Self {
        let workspace = workspace.into();
        let database_path = workspace.join(rank.to_string());
        let socket_path = workspace.join(format!("{}{}", rank, SOCKET_FILE_SUFFIX));
        Self {
            rank,
            total_shards,
            workspace,
            database_path,
            socket_path,
            config,
            client_id_seq: AtomicU64::new(0),
            gate: AdmissionGate::new(),
            coordination: Mutex::new(Coordination {
                listener: None,
                shutting_down: false,
            }),
            database: RwLock::new(None),
            schema: RwLock::new(Arc::new(Schema::new())),
            workers: DashMap::new(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Serve incoming connections until `shutdown` is called
    ///
    /// Returns `Ok(())` once the listener is closed or accept fails.
    ///
    /// # Errors
    ///
    /// * `ShardError::Open` if the database cannot be opened
    /// * `ShardError::Bind` if the socket cannot be bound
    pub fn run(self: &Arc<Self>) -> ShardResult<()> {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {
                debug!(target: "strata::shard", rank = self.rank, path = %self.socket_path.display(), "Removed stale socket file")
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(target: "strata::shard", rank = self.rank, error = %e, "Failed to remove stale socket file")
            }
        }

        self.reload()?;

        let listener = UnixListener::bind(&self.socket_path).map_err(|source| ShardError::Bind {
            path: self.socket_path.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;

        {
            let mut coordination = self.coordination.lock();
            if coordination.shutting_down {
                drop(listener);
                self.remove_socket_file();
                info!(target: "strata::shard", rank = self.rank, "Shutdown requested before listening");
                return Ok(());
            }
            coordination.listener = Some(listener);
        }

        info!(target: "strata::shard", rank = self.rank, path = %self.socket_path.display(), "Listening");

        let poll = self.config.accept_poll();
        loop {
            let accepted = {
                let coordination = self.coordination.lock();
                match coordination.listener.as_ref() {
                    Some(listener) => listener.accept(),
                    None => {
                        info!(target: "strata::shard", rank = self.rank, "Closing down - listener closed");
                        return Ok(());
                    }
                }
            };

            match accepted {
                Ok((stream, _addr)) => self.spawn_worker(stream),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(poll),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    info!(target: "strata::shard", rank = self.rank, error = %e, "Closing down - accept failed");
                    return Ok(());
                }
            }
        }
    }

    /// Stop accepting connections
    ///
    /// Connected workers keep running until their clients disconnect. Writes
    /// buffered so far are persisted. Safe to call more than once; later
    /// calls only log.
    pub fn shutdown(&self) {
        {
            let mut coordination = self.coordination.lock();
            self.shutdown0(&mut coordination);
        }
        self.flush_database();
    }

    fn flush_database(&self) {
        let database = self.database.read().clone();
        if let Some(db) = database {
            match db.flush() {
                Ok(()) => debug!(target: "strata::shard", rank = self.rank, "Database flushed"),
                // A concurrent reload already closed, and so persisted, it
                Err(DocError::Closed) => {}
                Err(e) => {
                    warn!(target: "strata::shard", rank = self.rank, error = %e, "Failed to flush database")
                }
            }
        }
    }

    /// Close the database handle for good
    ///
    /// Called once the server is done serving. Workers still connected get
    /// `NotLoaded` from then on.
    pub fn close_database(&self) -> ShardResult<()> {
        match self.database.write().take() {
            Some(db) => {
                db.close()?;
                info!(target: "strata::shard", rank = self.rank, "Database closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn shutdown0(&self, coordination: &mut Coordination) {
        match coordination.listener.take() {
            Some(listener) => {
                drop(listener);
                self.remove_socket_file();
                info!(target: "strata::shard", rank = self.rank, "Server socket closed");
            }
            None => {
                warn!(target: "strata::shard", rank = self.rank, "Failed to close server socket - not open");
            }
        }
        coordination.shutting_down = true;
    }

    fn remove_socket_file(&self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(target: "strata::shard", rank = self.rank, error = %e, "Failed to remove socket file");
            }
        }
    }

    /// Whether `shutdown` has been called
    pub fn is_shutting_down(&self) -> bool {
        self.coordination.lock().shutting_down
    }

    /// Close the current database handle and open a fresh one
    ///
    /// Rebuilds the schema at the next revision. Failure to close the old
    /// handle is logged; failure to open the new one is returned and leaves
    /// the server without a database.
    ///
    /// Callers must hold the maintenance lock with no pending transactions
    /// (or be starting up), since in-flight transactions would otherwise see
    /// a closed handle.
    pub fn reload(&self) -> ShardResult<()> {
        let mut database = self.database.write();
        if let Some(previous) = database.take() {
            if let Err(e) = previous.close() {
                warn!(target: "strata::shard", rank = self.rank, error = %e, "Failed to close database before reloading");
            }
        }

        let fresh = DocDb::open(&self.database_path).map_err(|source| ShardError::Open {
            path: self.database_path.clone(),
            source,
        })?;
        let next = self
            .schema
            .read()
            .refresh(&fresh)
            .map_err(|source| ShardError::Open {
                path: self.database_path.clone(),
                source,
            })?;
        let revision = next.revision();

        *self.schema.write() = Arc::new(next);
        *database = Some(Arc::new(fresh));

        info!(target: "strata::shard", rank = self.rank, revision, "Schema reloaded");
        Ok(())
    }

    /// Reload, aborting the process if the database cannot be reopened
    ///
    /// A shard without its data cannot serve anything.
    pub(crate) fn reload_or_abort(&self) {
        if let Err(e) = self.reload() {
            error!(target: "strata::shard", rank = self.rank, error = %e, "Reload failed, aborting");
            std::process::abort();
        }
    }

    fn spawn_worker(self: &Arc<Self>, stream: UnixStream) {
        let id = self.client_id_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let worker = match stream
            .set_nonblocking(false)
            .and_then(|_| ShardServerWorker::new(Arc::clone(self), id, stream))
        {
            Ok(worker) => worker,
            Err(e) => {
                warn!(target: "strata::shard", rank = self.rank, worker = id, error = %e, "Failed to set up connection");
                return;
            }
        };

        self.workers.insert(
            id,
            WorkerEntry {
                connected_at: Instant::now(),
            },
        );

        let spawned = thread::Builder::new()
            .name(format!("strata-shard-{}-w{}", self.rank, id))
            .spawn(move || worker.run());
        if let Err(e) = spawned {
            // The closure (and the worker with it) was dropped, which already
            // deregistered it
            warn!(target: "strata::shard", rank = self.rank, worker = id, error = %e, "Failed to spawn worker thread");
        }
    }

    pub(crate) fn worker_exited(&self, id: u64) {
        if let Some((_, entry)) = self.workers.remove(&id) {
            debug!(target: "strata::shard", rank = self.rank, worker = id, served_ms = entry.connected_at.elapsed().as_millis() as u64, "Worker exited");
        }
    }

    /// Number of connections currently being served
    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }

    /// Wait until every connected worker has exited
    ///
    /// # Returns
    /// * `true` if all workers exited within `timeout`
    /// * `false` if the deadline passed with workers still running
    pub fn wait_for_workers(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let sleep_duration = Duration::from_millis(1);

        while !self.workers.is_empty() {
            if start.elapsed() > timeout {
                return false;
            }
            thread::sleep(sleep_duration);
        }
        true
    }

    // =========================================================================
    // Coordination primitives
    // =========================================================================

    /// Take a transaction slot unless maintenance is active
    pub fn begin_transaction(&self) -> ShardResult<()> {
        self.gate
            .begin_transaction()
            .map_err(|owner| ShardError::MaintenanceInProgress { owner })
    }

    /// Give back a transaction slot
    pub fn end_transaction(&self) {
        self.gate.end_transaction();
    }

    /// Claim the maintenance lock for `worker` without blocking
    pub fn claim_maintenance(&self, worker: u64) -> ShardResult<()> {
        self.gate
            .claim_maintenance(worker)
            .map_err(|owner| ShardError::MaintenanceInProgress { owner })
    }

    /// Release the maintenance lock held by `worker`
    pub fn release_maintenance(&self, worker: u64) -> bool {
        self.gate.release_maintenance(worker)
    }

    /// Wait for pending transactions to drain, up to the configured timeout
    pub fn wait_for_transactions(&self) -> ShardResult<()> {
        if self.gate.wait_for_quiescence(self.config.drain_timeout()) {
            Ok(())
        } else {
            Err(ShardError::DrainTimeout {
                pending: self.gate.pending_transactions(),
            })
        }
    }

    /// Transactions currently holding a slot
    pub fn pending_transactions(&self) -> i64 {
        self.gate.pending_transactions()
    }

    /// Worker holding the maintenance lock, 0 if none
    pub fn maintenance_owner(&self) -> u64 {
        self.gate.maintenance_owner()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current database handle
    pub fn database(&self) -> ShardResult<Arc<DocDb>> {
        self.database.read().clone().ok_or(ShardError::NotLoaded)
    }

    /// Current schema snapshot
    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema.read())
    }

    /// Coordination counters and lifecycle state
    pub fn status(&self) -> StatusInfo {
        StatusInfo {
            rank: self.rank,
            total_shards: self.total_shards,
            revision: self.schema.read().revision(),
            pending_transactions: self.gate.pending_transactions(),
            maintenance_owner: self.gate.maintenance_owner(),
            live_workers: self.workers.len() as u64,
            shutting_down: self.is_shutting_down(),
        }
    }

    /// This shard's rank
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Number of shards in the workspace
    pub fn total_shards(&self) -> u32 {
        self.total_shards
    }

    /// Workspace root
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// `<workspace>/<rank>`
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// `<workspace>/<rank>_sock`
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Active configuration
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }
}

impl std::fmt::Debug for ShardServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardServer")
            .field("rank", &self.rank)
            .field("total_shards", &self.total_shards)
            .field("socket_path", &self.socket_path)
            .finish_non_exhaustive()
    }
}

/// Socket path for `rank` under `workspace`
pub fn socket_path_for(workspace: &Path, rank: u32) -> PathBuf {
    workspace.join(format!("{}{}", rank, SOCKET_FILE_SUFFIX))
}
