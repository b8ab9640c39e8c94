//! stream — byte-stream backends and the buffered channel the codecs use.
//!
//! - `ByteStream`: the transport contract (read/write/tell/seek/eof/close).
//! - plain.rs   — `PlainStream` over `std::fs::File` (seekable).
//! - gzip.rs    — `GzipStream` over flate2 (sequential only).
//! - memory.rs  — `MemoryStream` (shared in-memory buffer) and `Cursor<Vec<u8>>`.
//! - channel.rs — `Channel`: read-ahead/write-behind buffering, logical offsets,
//!   line reads and in-place patching.
//!
//! Only seekable streams support page jumps, count patching and reconnect.

use anyhow::{bail, Result};
use std::fmt;
use std::fs::File;
use std::io::SeekFrom;
use std::path::Path;

use crate::error::SddsError;

pub mod channel;
pub mod gzip;
pub mod memory;
pub mod plain;

pub use channel::Channel;
pub use gzip::GzipStream;
pub use memory::MemoryStream;
pub use plain::PlainStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Plain,
    Gzip,
    Memory,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamKind::Plain => "plain",
            StreamKind::Gzip => "gzip",
            StreamKind::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, read only.
    Read,
    /// New or truncated file, written from the start.
    Create,
    /// Existing file, read then extended (or patched in place when seekable).
    Update,
}

/// Transport contract every backend implements.
pub trait ByteStream: Send {
    /// Read up to `buf.len()` bytes; 0 means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn tell(&mut self) -> Result<u64>;
    /// Fails with `Usage` on sequential streams.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn at_eof(&mut self) -> Result<bool>;
    fn seekable(&self) -> bool;
    fn kind(&self) -> StreamKind;
    /// Flush trailers and release the handle; further use is an error.
    fn finish(&mut self) -> Result<()>;
    /// Underlying file handle, used for advisory locking.
    fn file(&self) -> Option<&File> {
        None
    }
}

pub(crate) fn not_seekable(kind: StreamKind) -> anyhow::Error {
    anyhow::Error::new(SddsError::Usage(format!(
        "{} stream does not support seeking",
        kind
    )))
}

/// Pick the backend from the path's extension and open it.
pub fn open_stream(path: &Path, mode: OpenMode) -> Result<Box<dyn ByteStream>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("gz") => Ok(Box::new(GzipStream::open(path, mode)?)),
        Some("xz") | Some("lzma") => bail!(SddsError::Usage(format!(
            "{}: lzma streams are not supported",
            path.display()
        ))),
        _ => Ok(Box::new(PlainStream::open(path, mode)?)),
    }
}
