//! Length-delimited framing
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (BE)  | payload: len bytes        |
//! +----------------+---------------------------+
//! ```
//!
//! Payloads are MessagePack with named fields. A stream that ends cleanly
//! before a length prefix is a graceful close (`Ok(None)`); ending anywhere
//! else is `CodecError::Truncated`.

use crate::error::CodecError;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 4;

/// Default cap on a single payload (64 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Read one frame payload
///
/// Returns `Ok(None)` when the stream ends before any header byte.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, CodecError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let got = fill(reader, &mut header)?;
    if got == 0 {
        return Ok(None);
    }
    if got < FRAME_HEADER_LEN {
        return Err(CodecError::Truncated {
            read: got,
            expected: FRAME_HEADER_LEN,
        });
    }

    let len = BigEndian::read_u32(&header) as usize;
    if len > max_len {
        return Err(CodecError::FrameTooLarge { len, max: max_len });
    }

    // Grows with the bytes that actually arrive, not the declared length
    let mut payload = Vec::new();
    let got = reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
    if got < len {
        return Err(CodecError::Truncated {
            read: got,
            expected: len,
        });
    }
    Ok(Some(payload))
}

/// Write one frame; the caller decides when to flush
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        CodecError::Encode(format!("payload of {} bytes cannot be framed", payload.len()))
    })?;
    writer.write_u32::<BigEndian>(len)?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read and decode one message
pub fn read_message<R: Read, T: DeserializeOwned>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<T>, CodecError> {
    match read_frame(reader, max_len)? {
        Some(payload) => Ok(Some(rmp_serde::from_slice(&payload)?)),
        None => Ok(None),
    }
}

/// Encode and write one message; the caller decides when to flush
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), CodecError> {
    let payload = rmp_serde::to_vec_named(message)?;
    write_frame(writer, &payload)
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(read)
}
