//! dataset/read — page input and auto-recovery.
//!
//! Parameter, array and row-count failures are always fatal. A row-level
//! failure (format or truncation) either:
//! - with auto-recovery: keeps the rows read so far, marks the dataset
//!   recovered and parks the stream at its end, so no later page is tried;
//! - without: keeps the partial page but fails the call and refuses further
//!   reads until the caller repositions with `goto_page`.

use anyhow::{bail, Result};
use log::{debug, warn};

use super::core::{Access, Dataset, DatasetState};
use crate::codec::{collect_rows, ReadOptions};
use crate::error::SddsError;
use crate::metrics::{record_auto_recovery, record_page_read};
use crate::page::PageData;

impl Dataset {
    /// Read the next page. `Ok(None)` at end of data (or after recovery).
    pub fn read_page(&mut self) -> Result<Option<u32>> {
        self.read_page_with(&ReadOptions::default())
    }

    /// Read the next page with sparse selection, a trailing-row window or
    /// per-interval statistics.
    pub fn read_page_with(&mut self, opts: &ReadOptions) -> Result<Option<u32>> {
        self.track(|ds| ds.read_page_inner(opts))
    }

    pub(crate) fn read_page_inner(&mut self, opts: &ReadOptions) -> Result<Option<u32>> {
        self.require_access(Access::Read, "read_page")?;
        self.require_state(
            &[DatasetState::LayoutReady, DatasetState::PageActive, DatasetState::PageClosed],
            "read_page",
        )?;
        if self.recovered {
            return Ok(None);
        }
        if self.needs_recovery {
            bail!(SddsError::Usage(
                "previous page failed; reposition with goto_page or enable auto-recovery".into()
            ));
        }
        opts.validate()?;

        let (Some(ch), Some(codec)) = (self.ch.as_mut(), self.codec.as_mut()) else {
            bail!(SddsError::Usage("dataset has no open stream".into()));
        };
        let start = codec.resume_offset(ch);
        let mut page = PageData::new(&self.layout, self.cfg.row_increment)?;

        let failure = match codec.read_page_head(ch, &self.layout, &mut page) {
            Ok(None) => {
                debug!("dataset: end of data after page {}", self.page_number);
                return Ok(None);
            }
            Ok(Some(limit)) => collect_rows(codec.as_mut(), ch, &self.layout, &mut page.table, limit, opts)?.error,
            Err(e) => return Err(e.context(format!("read head of page {}", self.page_number + 1))),
        };

        let number = self.page_number + 1;
        if let Some(e) = failure {
            if !self.cfg.auto_recover {
                self.needs_recovery = true;
                self.page_number = number;
                self.page = Some(page);
                self.state = DatasetState::PageActive;
                return Err(e.context(format!("read page {}", number)));
            }
            warn!(
                "dataset: page {} recovered with {} rows: {:#}",
                number,
                page.table.rows(),
                e
            );
            ch.seek_end()?;
            codec.reset();
            self.recovered = true;
            record_auto_recovery();
        }

        self.page_number = number;
        if self.page_offsets.len() < number as usize {
            self.page_offsets.push(start);
        }
        self.page = Some(page);
        self.apply_deferred_units()?;
        self.state = DatasetState::PageActive;
        record_page_read(self.row_count() as u64);
        debug!("dataset: page {} read ({} rows)", number, self.row_count());
        Ok(Some(number))
    }
}
