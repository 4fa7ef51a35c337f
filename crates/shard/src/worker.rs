//! Per-connection worker
//!
//! A `ShardServerWorker` owns one client connection and serves it on its own
//! thread: read a request frame, execute it under the coordination rules,
//! write exactly one response frame, flush, repeat.
//!
//! ## Session state
//!
//! ```text
//!            TxnBegin              MaintBegin
//!   Idle  -------------> InTxn     Idle -------------> InMaint
//!         <-------------                <-------------
//!            TxnEnd                       MaintEnd
//! ```
//!
//! Data commands outside `InTxn` take a slot for just that command.
//! Maintenance commands outside `InMaint` claim the lock for just that
//! command. A worker in `InMaint` runs data commands without a slot: it
//! already has exclusive access.
//!
//! ## Termination
//!
//! Claims are released in `Drop`, so every exit path (EOF, framing error,
//! write failure, panic) gives back the transaction slot and the maintenance
//! lock before the connection is closed.

use crate::error::{ShardError, ShardResult};
use crate::server::ShardServer;
use std::io::{self, BufReader, BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use strata_wire::{
    read_message, write_message, Command, CommandClass, Output, Request, Response,
    PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};

/// Serves one client connection
pub struct ShardServerWorker {
    server: Arc<ShardServer>,
    id: u64,
    input: BufReader<UnixStream>,
    output: BufWriter<UnixStream>,
    pending_transaction: bool,
    pending_maintenance: bool,
    last_error: Option<ShardError>,
}

impl ShardServerWorker {
    /// Wrap an accepted connection
    pub fn new(server: Arc<ShardServer>, id: u64, stream: UnixStream) -> io::Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            server,
            id,
            input: BufReader::new(stream),
            output: BufWriter::new(writer),
            pending_transaction: false,
            pending_maintenance: false,
            last_error: None,
        })
    }

    /// Worker id, also the maintenance lock token
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Serve requests until the client disconnects or the connection fails
    pub fn run(mut self) {
        debug!(target: "strata::shard::worker", worker = self.id, "Client connected");
        let max_frame = self.server.config().max_frame_bytes;

        loop {
            let request: Request = match read_message(&mut self.input, max_frame) {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    self.last_error = Some(e.into());
                    break;
                }
            };

            let response = self.dispatch(request);

            let written = write_message(&mut self.output, &response)
                .map_err(ShardError::from)
                .and_then(|_| self.output.flush().map_err(ShardError::from));
            if let Err(e) = written {
                self.last_error = Some(e);
                break;
            }
        }

        match &self.last_error {
            Some(e) => {
                info!(target: "strata::shard::worker", worker = self.id, error = %e, "Connection terminated")
            }
            None => debug!(target: "strata::shard::worker", worker = self.id, "Client disconnected"),
        }
    }

    /// Turn one request into exactly one response
    fn dispatch(&mut self, request: Request) -> Response {
        if let Some(client) = request.schema_revision {
            let current = self.server.schema().revision();
            if client != current {
                return Response::Err(ShardError::SchemaChanged { client, current }.to_wire());
            }
        }

        let name = request.command.name();
        match self.execute(request.command) {
            Ok(output) => Response::Ok(output),
            Err(e) => {
                debug!(target: "strata::shard::worker", worker = self.id, command = name, error = %e, "Command failed");
                Response::Err(e.to_wire())
            }
        }
    }

    fn execute(&mut self, command: Command) -> ShardResult<Output> {
        match command.class() {
            CommandClass::Direct => self.run_direct(command),
            CommandClass::TransactionLifecycle => match command {
                Command::TxnBegin => self.begin_transaction().map(|_| Output::Unit),
                Command::TxnEnd => self.end_transaction().map(|_| Output::Unit),
                other => Err(misrouted(&other, "transaction lifecycle")),
            },
            CommandClass::MaintenanceLifecycle => match command {
                Command::MaintBegin => self.begin_maintenance().map(|_| Output::Unit),
                Command::MaintEnd => self.end_maintenance().map(|_| Output::Unit),
                other => Err(misrouted(&other, "maintenance lifecycle")),
            },
            CommandClass::Maintenance => self.run_maintenance(command),
            CommandClass::Data => self.run_data(command),
        }
    }

    fn run_direct(&mut self, command: Command) -> ShardResult<Output> {
        match command {
            Command::Ping => Ok(Output::Pong),
            Command::Hello => Ok(Output::Hello {
                rank: self.server.rank(),
                total_shards: self.server.total_shards(),
                protocol_version: PROTOCOL_VERSION,
                client_id: self.id,
            }),
            Command::Schema => Ok(Output::Schema(self.server.schema().to_info())),
            Command::Status => Ok(Output::Status(self.server.status())),
            Command::Shutdown => {
                info!(target: "strata::shard::worker", worker = self.id, "Shutdown requested by client");
                self.server.shutdown();
                Ok(Output::Unit)
            }
            other => Err(misrouted(&other, "direct")),
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    fn begin_transaction(&mut self) -> ShardResult<()> {
        if self.pending_transaction {
            return Err(ShardError::TransactionActive);
        }
        if self.pending_maintenance {
            return Err(ShardError::MaintenanceInProgress { owner: self.id });
        }
        self.server.begin_transaction()?;
        self.pending_transaction = true;
        Ok(())
    }

    /// Persist the transaction's writes, then give back its slot
    ///
    /// The slot is released even if persisting fails; the failure is
    /// reported to the client.
    fn end_transaction(&mut self) -> ShardResult<()> {
        if !self.pending_transaction {
            return Err(ShardError::TransactionNotActive);
        }
        let flushed = self.flush_database();
        self.server.end_transaction();
        self.pending_transaction = false;
        flushed
    }

    /// Persist buffered document writes of the current handle
    ///
    /// Must run while this worker holds a slot or the maintenance lock, so
    /// the handle cannot be closed underneath it.
    fn flush_database(&self) -> ShardResult<()> {
        self.server.database()?.flush()?;
        Ok(())
    }

    fn run_data(&mut self, command: Command) -> ShardResult<Output> {
        if self.pending_transaction {
            return self.apply_data(command);
        }
        if self.pending_maintenance {
            let output = self.apply_data(command)?;
            self.flush_database()?;
            return Ok(output);
        }

        self.begin_transaction()?;
        let result = self.apply_data(command);
        let ended = self.end_transaction();
        let output = result?;
        ended?;
        Ok(output)
    }

    fn apply_data(&self, command: Command) -> ShardResult<Output> {
        let db = self.server.database()?;
        let output = match command {
            Command::DocInsert { collection, doc } => Output::DocId(db.insert(&collection, doc)?),
            Command::DocRead { collection, id } => Output::Document(db.read(&collection, id)?),
            Command::DocUpdate {
                collection,
                id,
                doc,
            } => {
                db.update(&collection, id, doc)?;
                Output::Unit
            }
            Command::DocDelete { collection, id } => {
                db.delete(&collection, id)?;
                Output::Unit
            }
            Command::DocCount { collection } => Output::Count(db.count(&collection)?),
            Command::IndexLookup {
                collection,
                path,
                value,
            } => Output::DocIds(db.lookup(&collection, &path, &value)?),
            other => return Err(misrouted(&other, "data")),
        };
        Ok(output)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Claim the lock, then wait for pending transactions to drain
    ///
    /// The lock is given back if the drain times out.
    fn begin_maintenance(&mut self) -> ShardResult<()> {
        if self.pending_maintenance {
            return Ok(());
        }
        if self.pending_transaction {
            return Err(ShardError::TransactionActive);
        }

        self.server.claim_maintenance(self.id)?;
        self.pending_maintenance = true;
        debug!(target: "strata::shard::worker", worker = self.id, "Maintenance lock claimed");

        if let Err(e) = self.server.wait_for_transactions() {
            self.release_maintenance();
            return Err(e);
        }
        Ok(())
    }

    fn end_maintenance(&mut self) -> ShardResult<()> {
        if !self.pending_maintenance {
            return Err(ShardError::MaintenanceNotHeld);
        }
        self.release_maintenance();
        Ok(())
    }

    fn release_maintenance(&mut self) {
        if self.pending_maintenance {
            self.server.release_maintenance(self.id);
            self.pending_maintenance = false;
            debug!(target: "strata::shard::worker", worker = self.id, "Maintenance lock released");
        }
    }

    fn run_maintenance(&mut self, command: Command) -> ShardResult<Output> {
        let one_shot = !self.pending_maintenance;
        if one_shot {
            self.begin_maintenance()?;
        }
        let result = self.apply_maintenance(command);
        if one_shot {
            self.release_maintenance();
        }
        result
    }

    /// Mutate the schema, then reload so the mirror and handle match disk
    fn apply_maintenance(&self, command: Command) -> ShardResult<Output> {
        // Admission is paused; this only catches refused transactions that
        // briefly bumped the count
        self.server.wait_for_transactions()?;

        let db = self.server.database()?;
        let mutation = match &command {
            Command::CollectionCreate { name } => db.create_collection(name),
            Command::CollectionDrop { name } => db.drop_collection(name),
            Command::CollectionRename { from, to } => db.rename_collection(from, to),
            Command::IndexCreate { collection, path } => db.create_index(collection, path),
            Command::IndexDrop { collection, path } => db.drop_index(collection, path),
            other => return Err(misrouted(other, "maintenance")),
        };
        drop(db);

        // Reload even after a failed mutation: a partial change on disk must
        // not leave the mirror stale
        self.server.reload_or_abort();
        mutation?;

        let revision = self.server.schema().revision();
        info!(target: "strata::shard::worker", worker = self.id, command = command.name(), revision, "Maintenance applied");
        Ok(Output::Revision(revision))
    }

    /// Give back every claim this worker holds
    fn release_claims(&mut self) {
        if self.pending_transaction {
            if let Err(e) = self.end_transaction() {
                warn!(target: "strata::shard::worker", worker = self.id, error = %e, "Failed to persist abandoned transaction");
            }
            warn!(target: "strata::shard::worker", worker = self.id, "Released transaction abandoned by client");
        }
        if self.pending_maintenance {
            self.release_maintenance();
            warn!(target: "strata::shard::worker", worker = self.id, "Released maintenance lock abandoned by client");
        }
    }
}

fn misrouted(command: &Command, class: &str) -> ShardError {
    ShardError::Protocol(format!("{} is not a {} command", command.name(), class))
}

impl Drop for ShardServerWorker {
    fn drop(&mut self) {
        self.release_claims();
        self.server.worker_exited(self.id);
        // input/output drop after this, closing the connection
    }
}
