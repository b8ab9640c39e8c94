//! dataset/nav — random page access, detaching the stream, termination.

use anyhow::{bail, Context, Result};
use log::{debug, info};

use super::core::{Access, Dataset, DatasetState};
use super::open::take_lock;
use crate::codec::ReadOptions;
use crate::error::SddsError;
use crate::stream::{open_stream, Channel, OpenMode};

impl Dataset {
    /// Position so that the next `read_page` returns page `n` (1-based).
    /// Pages not visited yet are read through. Seekable streams only.
    pub fn goto_page(&mut self, n: u32) -> Result<()> {
        self.track(|ds| ds.goto_page_inner(n))
    }

    fn goto_page_inner(&mut self, n: u32) -> Result<()> {
        self.require_access(Access::Read, "goto_page")?;
        self.require_state(
            &[DatasetState::LayoutReady, DatasetState::PageActive, DatasetState::PageClosed],
            "goto_page",
        )?;
        if n == 0 {
            bail!(SddsError::Usage("page numbers start at 1".into()));
        }
        let ch = self.channel()?;
        if !ch.seekable() {
            bail!(SddsError::Usage(format!("goto_page needs a seekable stream, not {}", ch.kind())));
        }
        self.recovered = false;
        self.needs_recovery = false;
        if self.page_offsets.len() < n as usize {
            let (from, number) = match self.page_offsets.last() {
                Some(&off) => (off, self.page_offsets.len() as u32 - 1),
                None => (self.data_start, 0),
            };
            self.position(from, number)?;
            let skip = ReadOptions::default().with_last_rows(0);
            while self.page_offsets.len() < n as usize {
                let read = self.read_page_inner(&skip)?;
                if read.is_none() || (self.recovered && self.page_offsets.len() < n as usize) {
                    bail!(SddsError::Usage(format!(
                        "page {} does not exist ({} pages)",
                        n,
                        self.page_offsets.len()
                    )));
                }
            }
        }
        let off = self.page_offsets[n as usize - 1];
        self.position(off, n - 1)?;
        self.recovered = false;
        self.page = None;
        self.state = DatasetState::LayoutReady;
        debug!("dataset: positioned at page {} (offset {})", n, off);
        Ok(())
    }

    fn position(&mut self, offset: u64, page_number: u32) -> Result<()> {
        self.channel()?.seek_to(offset)?;
        if let Some(codec) = self.codec.as_mut() {
            codec.reset();
        }
        self.page_number = page_number;
        Ok(())
    }

    // ---------- detach ----------

    /// Close the stream but keep everything needed to resume at the same
    /// place. Needs a file path and a seekable stream.
    pub fn disconnect(&mut self) -> Result<()> {
        self.track(|ds| {
            if ds.state == DatasetState::Disconnected {
                bail!(SddsError::Usage("dataset is already disconnected".into()));
            }
            if ds.path.is_none() {
                bail!(SddsError::Usage("only file-backed datasets can disconnect".into()));
            }
            let Some(ch) = ds.ch.take() else {
                bail!(SddsError::Usage("dataset has no open stream".into()));
            };
            if !ch.seekable() {
                let kind = ch.kind();
                ds.ch = Some(ch);
                bail!(SddsError::Usage(format!("cannot disconnect a {} stream", kind)));
            }
            let offset = match ds.codec.as_ref() {
                Some(codec) if ds.access == Access::Read => codec.resume_offset(&ch),
                _ => ch.tell(),
            };
            ch.finish()?;
            ds._lock = None;
            ds.reconnect_offset = Some(offset);
            ds.resume_state = ds.state;
            ds.state = DatasetState::Disconnected;
            debug!("dataset: disconnected at offset {}", offset);
            Ok(())
        })
    }

    pub fn reconnect(&mut self) -> Result<()> {
        self.track(|ds| {
            ds.require_state(&[DatasetState::Disconnected], "reconnect")?;
            let (Some(path), Some(offset)) = (ds.path.clone(), ds.reconnect_offset) else {
                bail!(SddsError::Usage("no saved position to reconnect to".into()));
            };
            let mode = match ds.access {
                Access::Read => OpenMode::Read,
                Access::Write => OpenMode::Update,
            };
            let mut ch = Channel::new(open_stream(&path, mode)?, Some(path.clone()))
                .with_context(|| format!("reconnect {}", path.display()))?;
            if ds.access == Access::Write {
                ds._lock = take_lock(&ch, &path, &ds.cfg)?;
            }
            ch.seek_to(offset)?;
            if let Some(codec) = ds.codec.as_mut() {
                codec.reset();
            }
            ds.ch = Some(ch);
            ds.reconnect_offset = None;
            ds.state = ds.resume_state;
            debug!("dataset: reconnected at offset {}", offset);
            Ok(())
        })
    }

    // ---------- end ----------

    /// Finalise the current page count, flush and close.
    pub fn terminate(mut self) -> Result<()> {
        let res = (|| -> Result<()> {
            if self.access == Access::Write {
                self.finalize_count()?;
            }
            if let Some(ch) = self.ch.take() {
                ch.finish()?;
            }
            Ok(())
        })();
        if let (Err(e), Some(h)) = (&res, &self.cfg.error_history) {
            h.record(e);
        }
        info!(
            "dataset: terminated after {} page(s){}",
            self.page_number,
            self.path
                .as_deref()
                .map(|p| format!(" ({})", p.display()))
                .unwrap_or_default()
        );
        res
    }
}
