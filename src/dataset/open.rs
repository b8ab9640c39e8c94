//! dataset/open — constructors: read, create, append, append-to-page, caller streams.
//!
//! Appending scans the existing pages first with a separate read-only
//! stream (rows are decoded but not kept), so page numbers and offsets
//! continue where the file ends.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use super::core::{Access, Dataset, DatasetState, StreamAccess};
use crate::codec::{codec_for, collect_rows, ReadOptions};
use crate::config::SddsConfig;
use crate::error::SddsError;
use crate::header::read_header;
use crate::layout::{DataMode, Encoding, Layout, RowCountPolicy};
use crate::lock::{try_lock_exclusive, LockGuard};
use crate::page::PageData;
use crate::stream::{open_stream, ByteStream, Channel, OpenMode};

/// What a pre-append scan learned about the existing pages.
struct PageScan {
    layout: Layout,
    data_start: u64,
    offsets: Vec<u64>,
    /// Count field of the last page rewritten to its exact row count, when
    /// it still holds a fixed-increment bound: (offset, bytes).
    stale_count: Option<(u64, Vec<u8>)>,
}

fn traced<T>(cfg: &SddsConfig, res: Result<T>) -> Result<T> {
    if let (Err(e), Some(h)) = (&res, &cfg.error_history) {
        h.record(e);
    }
    res
}

pub(crate) fn take_lock(ch: &Channel, path: &Path, cfg: &SddsConfig) -> Result<Option<LockGuard>> {
    if !cfg.lock_on_write {
        return Ok(None);
    }
    match ch.file() {
        Some(f) => Ok(Some(try_lock_exclusive(f, path)?)),
        None => Ok(None),
    }
}

fn scan_pages(path: &Path, cfg: &SddsConfig) -> Result<PageScan> {
    let stream = open_stream(path, OpenMode::Read)?;
    let mut ch = Channel::new(stream, Some(path.to_path_buf()))?;
    let layout = read_header(&mut ch, path.parent(), cfg.max_include_depth)
        .with_context(|| format!("read header of {}", path.display()))?;
    let data_start = ch.tell();
    let mut codec = codec_for(&layout);
    let skip = ReadOptions::default().with_last_rows(0);

    let mut offsets = Vec::new();
    let mut stale_count = None;
    loop {
        let start = codec.resume_offset(&ch);
        let mut page = PageData::new(&layout, cfg.row_increment)?;
        let head = codec.read_page_head(&mut ch, &layout, &mut page);
        let limit = match head {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => return Err(e).with_context(|| format!("scan page {} of {}", offsets.len() + 1, path.display())),
        };
        let out = collect_rows(codec.as_mut(), &mut ch, &layout, &mut page.table, limit, &skip)?;
        if let Some(e) = out.error {
            if cfg.auto_recover {
                warn!("append scan: {}: dropping malformed tail: {:#}", path.display(), e);
                break;
            }
            return Err(e).with_context(|| format!("scan page {} of {}", offsets.len() + 1, path.display()));
        }
        offsets.push(start);
        stale_count = None;
        if layout.data_mode.fixed_row_count && limit.bound() != Some(out.raw_rows) {
            if let Some(off) = codec.count_offset() {
                stale_count = Some((off, codec.encode_count(out.raw_rows)?));
            }
        }
    }
    debug!("append scan: {}: {} page(s)", path.display(), offsets.len());
    Ok(PageScan {
        layout,
        data_start,
        offsets,
        stale_count,
    })
}

impl Dataset {
    // ---------- read ----------

    pub fn open_read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_read_with(path, SddsConfig::from_env())
    }

    pub fn open_read_with<P: AsRef<Path>>(path: P, cfg: SddsConfig) -> Result<Self> {
        let path = path.as_ref();
        let res = open_stream(path, OpenMode::Read)
            .and_then(|s| Channel::new(s, Some(path.to_path_buf())))
            .and_then(|ch| Self::attach_reader(ch, Some(path.to_path_buf()), cfg.clone()));
        traced(&cfg, res)
    }

    fn attach_reader(mut ch: Channel, path: Option<PathBuf>, cfg: SddsConfig) -> Result<Self> {
        let base_dir = path.as_deref().and_then(Path::parent);
        let layout = read_header(&mut ch, base_dir, cfg.max_include_depth).with_context(|| {
            format!(
                "read header of {}",
                path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "stream".into())
            )
        })?;
        let codec = codec_for(&layout);
        let mut ds = Dataset::blank(layout, cfg, Access::Read, path);
        ds.data_start = ch.tell();
        ds.ch = Some(ch);
        ds.codec = Some(codec);
        ds.state = DatasetState::LayoutReady;
        debug!(
            "dataset: opened for reading ({} encoding, version {})",
            ds.layout.data_mode.encoding.name(),
            ds.layout.version()
        );
        Ok(ds)
    }

    // ---------- create ----------

    pub fn create<P: AsRef<Path>>(path: P, encoding: Encoding) -> Result<Self> {
        Self::create_with(path, encoding, SddsConfig::from_env())
    }

    pub fn create_with<P: AsRef<Path>>(path: P, encoding: Encoding, cfg: SddsConfig) -> Result<Self> {
        let path = path.as_ref();
        let res = (|| -> Result<Self> {
            let ch = Channel::new(open_stream(path, OpenMode::Create)?, Some(path.to_path_buf()))?;
            let lock = take_lock(&ch, path, &cfg)?;
            let mut ds = Dataset::blank(
                Layout::new(DataMode::new(encoding)),
                cfg.clone(),
                Access::Write,
                Some(path.to_path_buf()),
            );
            ds.ch = Some(ch);
            ds._lock = lock;
            Ok(ds)
        })();
        traced(&cfg, res)
    }

    /// Wrap a caller-supplied stream. Reading parses the header immediately;
    /// writing starts with an empty layout in the given encoding.
    pub fn from_stream(stream: Box<dyn ByteStream>, access: StreamAccess, cfg: SddsConfig) -> Result<Self> {
        let res = Channel::new(stream, None).and_then(|ch| match access {
            StreamAccess::Read => Self::attach_reader(ch, None, cfg.clone()),
            StreamAccess::Write(encoding) => {
                let mut ds = Dataset::blank(Layout::new(DataMode::new(encoding)), cfg.clone(), Access::Write, None);
                ds.ch = Some(ch);
                Ok(ds)
            }
        });
        traced(&cfg, res)
    }

    // ---------- append ----------

    /// Open an existing file to add pages after the last one.
    pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_append_with(path, SddsConfig::from_env())
    }

    pub fn open_append_with<P: AsRef<Path>>(path: P, cfg: SddsConfig) -> Result<Self> {
        let path = path.as_ref();
        let res = Self::open_update(path, cfg.clone()).map(|(mut ds, _)| {
            ds.state = if ds.page_number > 0 {
                DatasetState::PageClosed
            } else {
                DatasetState::LayoutReady
            };
            info!("dataset: appending to {} after page {}", path.display(), ds.page_number);
            ds
        });
        traced(&cfg, res)
    }

    /// Open an existing file to add rows to its last page with `update_page`.
    pub fn open_append_to_page<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_append_to_page_with(path, SddsConfig::from_env())
    }

    pub fn open_append_to_page_with<P: AsRef<Path>>(path: P, cfg: SddsConfig) -> Result<Self> {
        let path = path.as_ref();
        let res = (|| -> Result<Self> {
            let (mut ds, last) = Self::open_update(path, cfg.clone())?;
            let Some(last) = last else {
                ds.state = DatasetState::LayoutReady;
                return Ok(ds);
            };
            ds.resume_last_page(last)?;
            info!(
                "dataset: appending to page {} of {} ({} rows on stream)",
                ds.page_number,
                path.display(),
                ds.page_rows_written
            );
            Ok(ds)
        })();
        traced(&cfg, res)
    }

    /// Scan, reopen for update, lock, and settle a stale fixed count.
    /// Returns the dataset positioned at end of stream and the last page offset.
    fn open_update(path: &Path, cfg: SddsConfig) -> Result<(Self, Option<u64>)> {
        let scan = scan_pages(path, &cfg)?;
        let mut ch = Channel::new(open_stream(path, OpenMode::Update)?, Some(path.to_path_buf()))?;
        let lock = take_lock(&ch, path, &cfg)?;
        if ch.seekable() {
            if let Some((off, bytes)) = &scan.stale_count {
                ch.patch(*off, bytes)?;
                debug!("dataset: {}: finalised count of the last page", path.display());
            }
            ch.seek_end()?;
        }
        let codec = codec_for(&scan.layout);
        let last = scan.offsets.last().copied();
        let mut ds = Dataset::blank(scan.layout, cfg, Access::Write, Some(path.to_path_buf()));
        ds.page_number = scan.offsets.len() as u32;
        ds.page_offsets = scan.offsets;
        ds.data_start = scan.data_start;
        ds.ch = Some(ch);
        ds.codec = Some(codec);
        ds._lock = lock;
        Ok((ds, last))
    }

    /// Load the last page into memory and arm `update_page` for it.
    fn resume_last_page(&mut self, offset: u64) -> Result<()> {
        if self.layout.data_mode.column_major {
            bail!(SddsError::Usage("cannot append rows to a column-major page".into()));
        }
        let Some(ch) = self.ch.as_mut() else {
            bail!(SddsError::Usage("dataset has no open stream".into()));
        };
        if !ch.seekable() {
            bail!(SddsError::Usage(format!(
                "appending to a page needs a seekable stream, not {}",
                ch.kind()
            )));
        }
        let Some(codec) = self.codec.as_mut() else {
            bail!(SddsError::Usage("dataset has no codec".into()));
        };
        ch.seek_to(offset)?;
        codec.reset();
        let mut page = PageData::new(&self.layout, self.cfg.row_increment)?;
        let Some(limit) = codec.read_page_head(ch, &self.layout, &mut page)? else {
            bail!(SddsError::Truncation(format!("page at offset {} vanished", offset)));
        };
        let out = collect_rows(codec.as_mut(), ch, &self.layout, &mut page.table, limit, &ReadOptions::default())?;
        if let Some(e) = out.error {
            return Err(e).context("re-read last page for appending");
        }
        let count_offset = codec.count_offset();
        if count_offset.is_none() && self.layout.data_mode.row_count_policy() != RowCountPolicy::Suppressed {
            bail!(SddsError::Usage(
                "the row count of the last page cannot be patched in place".into()
            ));
        }
        ch.seek_end()?;
        codec.reset();

        self.count_offset = count_offset;
        self.table_cursor = page.table.rows();
        self.page_rows_written = out.raw_rows;
        self.count_value = limit.bound().unwrap_or(out.raw_rows);
        self.page_on_stream = true;
        self.page = Some(page);
        self.state = DatasetState::PageClosed;
        Ok(())
    }
}
