use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{ByteStream, OpenMode, StreamKind};
use crate::error::SddsError;

/// Uncompressed file. Seekable; supports every dataset operation.
#[derive(Debug)]
pub struct PlainStream {
    file: Option<File>,
    path: PathBuf,
}

impl PlainStream {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let mut oo = OpenOptions::new();
        match mode {
            OpenMode::Read => oo.read(true),
            OpenMode::Create => oo.read(true).write(true).create(true).truncate(true),
            OpenMode::Update => oo.read(true).write(true),
        };
        let file = oo
            .open(path)
            .with_context(|| format!("open {} ({:?})", path.display(), mode))?;
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn f(&mut self) -> Result<&mut File> {
        match self.file.as_mut() {
            Some(f) => Ok(f),
            None => Err(anyhow::Error::new(SddsError::Usage(format!(
                "{} is closed",
                self.path.display()
            )))),
        }
    }
}

impl ByteStream for PlainStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let path = self.path.clone();
        let f = self.f()?;
        loop {
            match f.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
            }
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let path = self.path.clone();
        self.f()?
            .write_all(buf)
            .with_context(|| format!("write {}", path.display()))
    }

    fn flush(&mut self) -> Result<()> {
        self.f()?.flush()?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.f()?.stream_position()?)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let path = self.path.clone();
        self.f()?
            .seek(pos)
            .with_context(|| format!("seek {} to {:?}", path.display(), pos))
    }

    fn at_eof(&mut self) -> Result<bool> {
        let f = self.f()?;
        let len = f.metadata()?.len();
        Ok(f.stream_position()? >= len)
    }

    fn seekable(&self) -> bool {
        true
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Plain
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut f) = self.file.take() {
            f.flush()?;
        }
        Ok(())
    }

    fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }
}
