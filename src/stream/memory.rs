use anyhow::{bail, Result};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use super::{ByteStream, StreamKind};
use crate::error::SddsError;

/// In-memory seekable stream whose buffer outlives the dataset that owns it.
/// Clones share the same bytes; each clone keeps its own position.
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    buf: Arc<Mutex<Vec<u8>>>,
    pos: u64,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buf: Arc::new(Mutex::new(bytes)),
            pos: 0,
        }
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Drop everything from `len` on.
    pub fn truncate(&self, len: usize) {
        if let Ok(mut b) = self.buf.lock() {
            b.truncate(len);
        }
    }

    fn with_buf<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> Result<R> {
        match self.buf.lock() {
            Ok(mut b) => Ok(f(&mut b)),
            Err(_) => bail!(SddsError::Usage("memory stream poisoned".into())),
        }
    }
}

impl ByteStream for MemoryStream {
    fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let pos = self.pos as usize;
        let n = self.with_buf(|b| {
            let start = pos.min(b.len());
            let n = out.len().min(b.len() - start);
            out[..n].copy_from_slice(&b[start..start + n]);
            n
        })?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let pos = self.pos as usize;
        self.with_buf(|b| {
            let end = pos + data.len();
            if b.len() < end {
                b.resize(end, 0);
            }
            b[pos..end].copy_from_slice(data);
        })?;
        self.pos += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.with_buf(|b| b.len() as i64)?;
        let target = match pos {
            SeekFrom::Start(o) => o as i64,
            SeekFrom::End(d) => len + d,
            SeekFrom::Current(d) => self.pos as i64 + d,
        };
        if target < 0 {
            bail!(SddsError::Usage(format!("seek before start ({})", target)));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn at_eof(&mut self) -> Result<bool> {
        let pos = self.pos;
        self.with_buf(|b| pos >= b.len() as u64)
    }

    fn seekable(&self) -> bool {
        true
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Memory
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ByteStream for Cursor<Vec<u8>> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(Read::read(self, buf)?)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        Ok(Write::write_all(self, buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.position())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(Seek::seek(self, pos)?)
    }

    fn at_eof(&mut self) -> Result<bool> {
        Ok(self.position() >= self.get_ref().len() as u64)
    }

    fn seekable(&self) -> bool {
        true
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Memory
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
