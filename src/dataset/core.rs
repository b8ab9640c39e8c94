//! dataset/core — the `Dataset` struct, its states and read accessors.
//!
//! Also:
//! - `track()`: every public fallible call goes through it so a configured
//!   `ErrorHistory` sees each failure exactly once.
//! - impl Drop: best-effort flush of a writer that was never terminated.

use anyhow::{bail, Result};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::codec::PageCodec;
use crate::config::SddsConfig;
use crate::error::SddsError;
use crate::layout::{DefKind, Encoding, Layout};
use crate::lock::LockGuard;
use crate::page::{ArrayData, ColumnBuffer, PageData};
use crate::stream::Channel;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetState {
    /// Stream open, layout still editable (writers only).
    Connected,
    /// Header written or read; no page yet.
    LayoutReady,
    /// A page is in memory and may still change.
    PageActive,
    /// The current page is on the stream; rows added now go out with `update_page`.
    PageClosed,
    /// Stream detached; `reconnect` resumes at the saved offset.
    Disconnected,
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatasetState::Connected => "connected",
            DatasetState::LayoutReady => "layout-ready",
            DatasetState::PageActive => "page-active",
            DatasetState::PageClosed => "page-closed",
            DatasetState::Disconnected => "disconnected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// How a caller-supplied stream is used by `Dataset::from_stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAccess {
    Read,
    Write(Encoding),
}

pub struct Dataset {
    pub(crate) ch: Option<Channel>,
    pub(crate) path: Option<PathBuf>,
    pub(crate) layout: Layout,
    pub(crate) codec: Option<Box<dyn PageCodec>>,
    pub(crate) page: Option<PageData>,
    pub(crate) state: DatasetState,
    pub(crate) resume_state: DatasetState,
    pub(crate) cfg: SddsConfig,
    pub(crate) access: Access,

    pub(crate) page_number: u32,
    /// Start offset of every page seen so far, index = page number - 1.
    pub(crate) page_offsets: Vec<u64>,
    /// First byte after the header.
    pub(crate) data_start: u64,

    // ---------- current page on the stream (writers) ----------
    pub(crate) page_on_stream: bool,
    pub(crate) count_offset: Option<u64>,
    /// Table rows already written for the current page.
    pub(crate) table_cursor: usize,
    /// Rows of the current page on the stream, flushed ones included.
    pub(crate) page_rows_written: u64,
    /// Value currently held by the page's count field.
    pub(crate) count_value: u64,

    // ---------- recovery ----------
    pub(crate) recovered: bool,
    pub(crate) needs_recovery: bool,

    /// (kind, name) -> factor, applied to each page read.
    pub(crate) deferred_units: HashMap<(DefKind, String), f64>,
    pub(crate) reconnect_offset: Option<u64>,

    pub(crate) _lock: Option<LockGuard>,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("access", &self.access)
            .field("page_number", &self.page_number)
            .field("recovered", &self.recovered)
            .finish_non_exhaustive()
    }
}

impl Dataset {
    pub(crate) fn blank(layout: Layout, cfg: SddsConfig, access: Access, path: Option<PathBuf>) -> Self {
        Self {
            ch: None,
            path,
            layout,
            codec: None,
            page: None,
            state: DatasetState::Connected,
            resume_state: DatasetState::Connected,
            cfg,
            access,
            page_number: 0,
            page_offsets: Vec::new(),
            data_start: 0,
            page_on_stream: false,
            count_offset: None,
            table_cursor: 0,
            page_rows_written: 0,
            count_value: 0,
            recovered: false,
            needs_recovery: false,
            deferred_units: HashMap::new(),
            reconnect_offset: None,
            _lock: None,
        }
    }

    // ---------- accessors ----------

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &SddsConfig {
        &self.cfg
    }

    pub fn state(&self) -> DatasetState {
        self.state
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Number of the page last started, read or written (1-based; 0 before any).
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// True once a malformed tail was accepted; no further pages are read.
    pub fn recovered(&self) -> bool {
        self.recovered
    }

    /// True after a row-level failure without auto-recovery.
    pub fn needs_recovery(&self) -> bool {
        self.needs_recovery
    }

    pub fn page_offsets(&self) -> &[u64] {
        &self.page_offsets
    }

    pub fn page(&self) -> Option<&PageData> {
        self.page.as_ref()
    }

    pub fn row_count(&self) -> usize {
        self.page.as_ref().map(|p| p.table.rows()).unwrap_or(0)
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        let i = self.layout.parameter_index(name)?;
        self.page.as_ref()?.params.get(i)?.as_ref()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnBuffer> {
        let i = self.layout.column_index(name)?;
        self.page.as_ref()?.table.column(i)
    }

    pub fn array(&self, name: &str) -> Option<&ArrayData> {
        let i = self.layout.array_index(name)?;
        self.page.as_ref()?.arrays.get(i)?.as_ref()
    }

    // ---------- internals ----------

    /// Run `f`, recording a failure in the configured error history.
    pub(crate) fn track<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let res = f(self);
        if let Err(e) = &res {
            if let Some(h) = &self.cfg.error_history {
                h.record(e);
            }
        }
        res
    }

    pub(crate) fn require_access(&self, access: Access, what: &str) -> Result<()> {
        if self.access != access {
            bail!(SddsError::Usage(format!(
                "{} needs a dataset opened for {}",
                what,
                match access {
                    Access::Read => "reading",
                    Access::Write => "writing",
                }
            )));
        }
        Ok(())
    }

    pub(crate) fn require_state(&self, allowed: &[DatasetState], what: &str) -> Result<()> {
        if !allowed.contains(&self.state) {
            bail!(SddsError::Usage(format!("{} is not allowed in state {}", what, self.state)));
        }
        Ok(())
    }

    pub(crate) fn channel(&mut self) -> Result<&mut Channel> {
        match self.ch.as_mut() {
            Some(ch) => Ok(ch),
            None => bail!(SddsError::Usage("dataset has no open stream".into())),
        }
    }

    pub(crate) fn page_mut(&mut self, what: &str) -> Result<&mut PageData> {
        match self.page.as_mut() {
            Some(p) => Ok(p),
            None => bail!(SddsError::Usage(format!("{} needs a started page", what))),
        }
    }

    pub(crate) fn layout_and_page(&mut self, what: &str) -> Result<(&Layout, &mut PageData)> {
        match self.page.as_mut() {
            Some(p) => Ok((&self.layout, p)),
            None => bail!(SddsError::Usage(format!("{} needs a started page", what))),
        }
    }

    /// Rewrite the count of the current page with its exact row count.
    /// Only fixed-increment pages on seekable streams carry a stale bound.
    pub(crate) fn finalize_count(&mut self) -> Result<()> {
        if !self.page_on_stream || !self.layout.data_mode.fixed_row_count {
            return Ok(());
        }
        let (Some(off), Some(ch), Some(codec)) = (self.count_offset, self.ch.as_mut(), self.codec.as_ref()) else {
            return Ok(());
        };
        if !ch.seekable() || self.count_value == self.page_rows_written {
            return Ok(());
        }
        let bytes = codec.encode_count(self.page_rows_written)?;
        ch.patch(off, &bytes)?;
        debug!(
            "dataset: page {} count finalised {} -> {}",
            self.page_number, self.count_value, self.page_rows_written
        );
        self.count_value = self.page_rows_written;
        Ok(())
    }

    pub(crate) fn reset_page_cursor(&mut self) {
        self.page_on_stream = false;
        self.count_offset = None;
        self.table_cursor = 0;
        self.page_rows_written = 0;
        self.count_value = 0;
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if self.access != Access::Write || self.ch.is_none() {
            return;
        }
        // errors on drop are ignored; terminate() reports them
        let _ = self.finalize_count();
        if let Some(ch) = self.ch.take() {
            let _ = ch.finish();
        }
    }
}
