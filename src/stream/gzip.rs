use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{not_seekable, ByteStream, OpenMode, StreamKind};
use crate::error::SddsError;

enum Inner {
    Reader(BufReader<MultiGzDecoder<File>>),
    Writer(GzEncoder<File>),
    Closed,
}

/// Gzip-compressed file. Sequential only: reads decode all members in turn,
/// `Update` appends a new member at the end of the file.
pub struct GzipStream {
    inner: Inner,
    pos: u64,
    path: PathBuf,
}

impl GzipStream {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let inner = match mode {
            OpenMode::Read => {
                let f = File::open(path)
                    .with_context(|| format!("open {} for reading", path.display()))?;
                Inner::Reader(BufReader::new(MultiGzDecoder::new(f)))
            }
            OpenMode::Create => {
                let f = File::create(path)
                    .with_context(|| format!("create {}", path.display()))?;
                Inner::Writer(GzEncoder::new(f, Compression::default()))
            }
            OpenMode::Update => {
                let f = OpenOptions::new()
                    .append(true)
                    .open(path)
                    .with_context(|| format!("open {} for append", path.display()))?;
                Inner::Writer(GzEncoder::new(f, Compression::default()))
            }
        };
        Ok(Self {
            inner,
            pos: 0,
            path: path.to_path_buf(),
        })
    }

    fn wrong_mode(&self, op: &str) -> anyhow::Error {
        anyhow::Error::new(SddsError::Usage(format!(
            "{}: cannot {} in the current mode",
            self.path.display(),
            op
        )))
    }
}

impl ByteStream for GzipStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Inner::Reader(r) = &mut self.inner else {
            return Err(self.wrong_mode("read"));
        };
        let n = r
            .read(buf)
            .with_context(|| format!("inflate {}", self.path.display()))?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let Inner::Writer(w) = &mut self.inner else {
            return Err(self.wrong_mode("write"));
        };
        w.write_all(buf)
            .with_context(|| format!("deflate {}", self.path.display()))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Inner::Writer(w) = &mut self.inner {
            w.flush()?;
        }
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Err(not_seekable(StreamKind::Gzip))
    }

    fn at_eof(&mut self) -> Result<bool> {
        match &mut self.inner {
            Inner::Reader(r) => Ok(r.fill_buf()?.is_empty()),
            _ => Ok(true),
        }
    }

    fn seekable(&self) -> bool {
        false
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Gzip
    }

    fn finish(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Writer(w) => {
                let f = w
                    .finish()
                    .with_context(|| format!("finish gzip member {}", self.path.display()))?;
                f.sync_all().ok();
            }
            Inner::Reader(_) | Inner::Closed => {}
        }
        Ok(())
    }

    fn file(&self) -> Option<&File> {
        match &self.inner {
            Inner::Reader(r) => Some(r.get_ref().get_ref()),
            Inner::Writer(w) => Some(w.get_ref()),
            Inner::Closed => None,
        }
    }
}

impl Drop for GzipStream {
    fn drop(&mut self) {
        if matches!(self.inner, Inner::Writer(_)) {
            if let Err(e) = self.finish() {
                log::warn!("gzip stream {} not finished cleanly: {:#}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn write_then_read_members() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "sdds-gz-{}-{}.gz",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)?
                .as_nanos()
        ));
        {
            let mut w = GzipStream::open(&path, OpenMode::Create)?;
            w.write_all(b"hello ")?;
            assert!(w.seek(SeekFrom::Start(0)).is_err());
            w.finish()?;
        }
        {
            let mut w = GzipStream::open(&path, OpenMode::Update)?;
            w.write_all(b"world")?;
            w.finish()?;
        }
        let mut r = GzipStream::open(&path, OpenMode::Read)?;
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
        assert!(r.at_eof()?);
        if r.write_all(b"x").is_ok() {
            bail!("write on a reader must fail");
        }
        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}
