//! Blocking client for one shard socket

use crate::error::{ShardError, ShardResult};
use std::io::{BufReader, BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use strata_wire::{
    read_message, write_message, Command, Output, Request, Response, DEFAULT_MAX_FRAME_BYTES,
};

/// Connection to a shard server
///
/// One request is in flight at a time: each call writes a frame and blocks
/// for the matching response.
pub struct ShardClient {
    input: BufReader<UnixStream>,
    output: BufWriter<UnixStream>,
    max_frame_bytes: usize,
}

impl ShardClient {
    /// Connect to the socket at `path`
    pub fn connect(path: impl AsRef<Path>) -> ShardResult<Self> {
        let stream = UnixStream::connect(path.as_ref())?;
        let writer = stream.try_clone()?;
        Ok(Self {
            input: BufReader::new(stream),
            output: BufWriter::new(writer),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        })
    }

    /// Run a command without a schema revision check
    pub fn execute(&mut self, command: Command) -> ShardResult<Output> {
        self.send(Request::new(command))
    }

    /// Run a command only if the shard is still at `revision`
    pub fn execute_at(&mut self, revision: u32, command: Command) -> ShardResult<Output> {
        self.send(Request::at_revision(revision, command))
    }

    /// Send a request and wait for its response
    ///
    /// # Errors
    ///
    /// * `ShardError::Remote` if the shard answered with an error
    /// * `ShardError::Protocol` if the shard closed the connection instead
    pub fn send(&mut self, request: Request) -> ShardResult<Output> {
        write_message(&mut self.output, &request)?;
        self.output.flush()?;

        match read_message(&mut self.input, self.max_frame_bytes)? {
            Some(Response::Ok(output)) => Ok(output),
            Some(Response::Err(e)) => Err(ShardError::Remote(e)),
            None => Err(ShardError::Protocol(format!(
                "connection closed before response to {}",
                request.command.name()
            ))),
        }
    }
}

impl std::fmt::Debug for ShardClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardClient").finish_non_exhaustive()
    }
}
