//! Buffered channel over a `ByteStream`.
//!
//! The channel keeps one logical offset (`tell`) across a read-ahead buffer
//! and a write-behind buffer, so codecs can mix line reads, exact binary
//! reads, writes and in-place patches without caring about what the backend
//! has actually consumed. It implements `std::io::Read`/`Write` so byteorder
//! works directly on it.

use anyhow::{bail, Result};
use std::fs::File;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use super::{ByteStream, StreamKind};
use crate::error::SddsError;

const READ_CHUNK: usize = 64 * 1024;
const WRITE_HIGH_WATER: usize = 64 * 1024;

pub struct Channel {
    stream: Box<dyn ByteStream>,
    rbuf: Vec<u8>,
    rpos: usize,
    wbuf: Vec<u8>,
    pos: u64,
    path: Option<PathBuf>,
}

impl Channel {
    pub fn new(mut stream: Box<dyn ByteStream>, path: Option<PathBuf>) -> Result<Self> {
        let pos = stream.tell()?;
        Ok(Self {
            stream,
            rbuf: Vec::new(),
            rpos: 0,
            wbuf: Vec::new(),
            pos,
            path,
        })
    }

    #[inline]
    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn seekable(&self) -> bool {
        self.stream.seekable()
    }

    pub fn kind(&self) -> StreamKind {
        self.stream.kind()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn file(&self) -> Option<&File> {
        self.stream.file()
    }

    // ---------- reading ----------

    /// Make sure unread bytes are buffered; returns how many are available.
    fn fill(&mut self) -> Result<usize> {
        self.flush_writes()?;
        if self.rpos < self.rbuf.len() {
            return Ok(self.rbuf.len() - self.rpos);
        }
        self.rbuf.resize(READ_CHUNK, 0);
        let n = self.stream.read(&mut self.rbuf)?;
        self.rbuf.truncate(n);
        self.rpos = 0;
        Ok(n)
    }

    fn consume(&mut self, n: usize) {
        self.rpos += n;
        self.pos += n as u64;
    }

    pub fn at_eof(&mut self) -> Result<bool> {
        Ok(self.fill()? == 0)
    }

    /// Next byte without consuming it.
    pub fn peek_byte(&mut self) -> Result<Option<u8>> {
        if self.fill()? == 0 {
            return Ok(None);
        }
        Ok(Some(self.rbuf[self.rpos]))
    }

    /// Read one line without its terminator (`\n` or `\r\n`).
    /// Returns false at end of stream when nothing was read. A line that is
    /// not UTF-8 is a format error.
    pub fn read_line(&mut self, line: &mut String) -> Result<bool> {
        line.clear();
        let mut bytes: Vec<u8> = Vec::new();
        let mut any = false;
        loop {
            if self.fill()? == 0 {
                break;
            }
            any = true;
            let start = self.rpos;
            let end = self.rbuf.len();
            match self.rbuf[start..end].iter().position(|&b| b == b'\n') {
                Some(i) => {
                    bytes.extend_from_slice(&self.rbuf[start..start + i]);
                    self.consume(i + 1);
                    break;
                }
                None => {
                    bytes.extend_from_slice(&self.rbuf[start..end]);
                    self.consume(end - start);
                }
            }
        }
        if !any {
            return Ok(false);
        }
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        match std::str::from_utf8(&bytes) {
            Ok(s) => line.push_str(s),
            Err(e) => bail!(SddsError::Format(format!(
                "line ending at offset {} is not valid UTF-8 (byte {})",
                self.pos,
                e.valid_up_to()
            ))),
        }
        Ok(true)
    }

    /// Fill `buf` as far as the stream allows; returns the byte count read.
    pub fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            let avail = self.fill()?;
            if avail == 0 {
                break;
            }
            let n = avail.min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&self.rbuf[self.rpos..self.rpos + n]);
            self.consume(n);
            done += n;
        }
        Ok(done)
    }

    /// Like `read_exact_or_eof` but a short read is a truncation error.
    pub fn read_exact_bytes(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        let n = self.read_exact_or_eof(buf)?;
        if n < buf.len() {
            bail!(SddsError::Truncation(format!(
                "stream ended inside {} ({} of {} bytes) at offset {}",
                what,
                n,
                buf.len(),
                self.pos
            )));
        }
        Ok(())
    }

    // ---------- writing ----------

    fn prepare_write(&mut self) -> Result<()> {
        if self.rpos < self.rbuf.len() {
            // backend is ahead of the logical position
            if !self.stream.seekable() {
                bail!(SddsError::Usage(
                    "cannot write after a partial read on a sequential stream".into()
                ));
            }
            self.stream.seek(SeekFrom::Start(self.pos))?;
        }
        self.rbuf.clear();
        self.rpos = 0;
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if !self.rbuf.is_empty() {
            self.prepare_write()?;
        }
        self.wbuf.extend_from_slice(data);
        self.pos += data.len() as u64;
        if self.wbuf.len() >= WRITE_HIGH_WATER {
            self.flush_writes()?;
        }
        Ok(())
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    fn flush_writes(&mut self) -> Result<()> {
        if !self.wbuf.is_empty() {
            self.stream.write_all(&self.wbuf)?;
            self.wbuf.clear();
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.flush_writes()?;
        self.stream.flush()
    }

    // ---------- positioning ----------

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        if !self.stream.seekable() {
            bail!(SddsError::Usage(format!(
                "{} stream does not support seeking",
                self.stream.kind()
            )));
        }
        self.flush_writes()?;
        self.stream.seek(SeekFrom::Start(offset))?;
        self.rbuf.clear();
        self.rpos = 0;
        self.pos = offset;
        Ok(())
    }

    /// Position at the end of the stream; returns the new offset.
    pub fn seek_end(&mut self) -> Result<u64> {
        if !self.stream.seekable() {
            // sequential: drain what is left
            let mut sink = vec![0u8; READ_CHUNK];
            while self.read_exact_or_eof(&mut sink)? > 0 {}
            return Ok(self.pos);
        }
        self.flush_writes()?;
        let end = self.stream.seek(SeekFrom::End(0))?;
        self.rbuf.clear();
        self.rpos = 0;
        self.pos = end;
        Ok(end)
    }

    /// Overwrite bytes at `offset`, then return to the current position.
    pub fn patch(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let here = self.pos;
        self.seek_to(offset)?;
        self.write_bytes(data)?;
        self.flush_writes()?;
        self.seek_to(here)
    }

    /// Flush and close the backend.
    pub fn finish(mut self) -> Result<()> {
        self.flush()?;
        self.stream.finish()
    }
}

impl io::Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let avail = self.fill().map_err(io::Error::other)?;
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.rbuf[self.rpos..self.rpos + n]);
        self.consume(n);
        Ok(n)
    }
}

impl io::Write for Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Channel::flush(self).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

    fn channel_over(bytes: &[u8]) -> (Channel, MemoryStream) {
        let mem = MemoryStream::from_bytes(bytes.to_vec());
        let ch = Channel::new(Box::new(mem.clone()), None).unwrap();
        (ch, mem)
    }

    #[test]
    fn lines_and_offsets() {
        let (mut ch, _) = channel_over(b"one\r\ntwo\nthree");
        let mut l = String::new();
        assert!(ch.read_line(&mut l).unwrap());
        assert_eq!(l, "one");
        assert_eq!(ch.tell(), 5);
        assert!(ch.read_line(&mut l).unwrap());
        assert_eq!(l, "two");
        assert!(ch.read_line(&mut l).unwrap());
        assert_eq!(l, "three");
        assert!(!ch.read_line(&mut l).unwrap());
        assert!(ch.at_eof().unwrap());
    }

    #[test]
    fn mixed_binary_and_patch() {
        let (mut ch, mem) = channel_over(b"");
        ch.write_i32::<LittleEndian>(7).unwrap();
        ch.write_str("abc").unwrap();
        ch.patch(0, &9i32.to_le_bytes()).unwrap();
        assert_eq!(ch.tell(), 7);
        ch.flush().unwrap();
        ch.seek_to(0).unwrap();
        assert_eq!(ch.read_i32::<LittleEndian>().unwrap(), 9);
        let mut b = [0u8; 5];
        assert_eq!(ch.read_exact_or_eof(&mut b).unwrap(), 3);
        assert_eq!(&b[..3], b"abc");
        assert_eq!(mem.contents().len(), 7);
    }

    #[test]
    fn write_after_partial_read_lands_at_logical_offset() {
        let (mut ch, mem) = channel_over(b"line1\nline2\n");
        let mut l = String::new();
        ch.read_line(&mut l).unwrap();
        ch.write_str("LINE2\n").unwrap();
        ch.flush().unwrap();
        assert_eq!(mem.contents(), b"line1\nLINE2\n");
    }

    #[test]
    fn short_exact_read_is_truncation() {
        let (mut ch, _) = channel_over(b"ab");
        let mut b = [0u8; 4];
        let e = ch.read_exact_bytes(&mut b, "row").unwrap_err();
        assert_eq!(
            crate::error::error_kind(&e),
            crate::error::ErrorKind::Truncation
        );
    }
}
