//! dataset/write — layout finalisation and page output.
//!
//! Row-count handling per policy:
//! - Variable: exact count; `update_page` patches it (seekable streams only).
//! - FixedIncrement: next multiple of the stride above the rows written,
//!   patched only when rows reach it; finalised exact on the next page or
//!   terminate. Non-seekable streams and column-major pages get exact counts.
//! - Suppressed: no count; rows just follow.

use anyhow::{bail, Result};
use log::{debug, info};

use super::core::{Access, Dataset, DatasetState};
use crate::codec::codec_for;
use crate::error::SddsError;
use crate::header::write_header;
use crate::layout::{DefKind, Encoding, Layout, RowCountPolicy};
use crate::metrics::{record_page_update, record_page_written};
use crate::page::{ArrayData, ColumnBuffer, PageData};
use crate::types::{ByteOrder, Value};
use crate::util::fixed_row_boundary;

const PAGE_EDIT_STATES: [DatasetState; 2] = [DatasetState::PageActive, DatasetState::PageClosed];

fn definition_index(layout: &Layout, kind: DefKind, name: &str) -> Result<usize> {
    layout
        .index_of(kind, name)
        .ok_or_else(|| anyhow::Error::new(SddsError::Schema(format!("unknown {} '{}'", kind, name))))
}

impl Dataset {
    // ---------- layout ----------

    /// Editable layout; only before `write_layout`.
    pub fn layout_mut(&mut self) -> Result<&mut Layout> {
        self.track(|ds| {
            ds.require_access(Access::Write, "layout_mut")?;
            ds.require_state(&[DatasetState::Connected], "layout_mut")
        })?;
        Ok(&mut self.layout)
    }

    /// Write the header. Binary output without a declared byte order gets
    /// the configured one (machine order by default).
    pub fn write_layout(&mut self) -> Result<()> {
        self.track(|ds| {
            ds.require_access(Access::Write, "write_layout")?;
            ds.require_state(&[DatasetState::Connected], "write_layout")?;
            let mode = &mut ds.layout.data_mode;
            if mode.encoding == Encoding::Binary && mode.byte_order.is_none() {
                mode.byte_order = Some(ds.cfg.output_byte_order.unwrap_or_else(ByteOrder::native));
            }
            let Some(ch) = ds.ch.as_mut() else {
                bail!(SddsError::Usage("dataset has no open stream".into()));
            };
            let version = write_header(ch, &mut ds.layout)?;
            ds.data_start = ch.tell();
            ds.codec = Some(codec_for(&ds.layout));
            ds.state = DatasetState::LayoutReady;
            info!(
                "dataset: header written (version {}, {} encoding, {} bytes)",
                version,
                ds.layout.data_mode.encoding.name(),
                ds.data_start
            );
            Ok(())
        })
    }

    // ---------- page building ----------

    /// Begin a new page with room for `expected_rows`. Returns its number.
    pub fn start_page(&mut self, expected_rows: usize) -> Result<u32> {
        self.track(|ds| {
            ds.require_access(Access::Write, "start_page")?;
            ds.require_state(
                &[DatasetState::LayoutReady, DatasetState::PageActive, DatasetState::PageClosed],
                "start_page",
            )?;
            if ds.state == DatasetState::PageActive && !ds.page_on_stream && ds.page.is_some() {
                bail!(SddsError::Usage(format!(
                    "page {} was started but never written",
                    ds.page_number
                )));
            }
            ds.finalize_count()?;
            ds.reset_page_cursor();
            let mut page = PageData::new(&ds.layout, ds.cfg.row_increment)?;
            page.table.reserve_rows(expected_rows)?;
            ds.page = Some(page);
            ds.page_number += 1;
            ds.state = DatasetState::PageActive;
            debug!("dataset: page {} started ({} rows expected)", ds.page_number, expected_rows);
            Ok(ds.page_number)
        })
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.track(|ds| {
            ds.require_state(&PAGE_EDIT_STATES, "set_parameter")?;
            let i = definition_index(&ds.layout, DefKind::Parameter, name)?;
            if ds.layout.parameters()[i].fixed_value.is_some() {
                bail!(SddsError::Usage(format!("parameter '{}' has a fixed value", name)));
            }
            let (layout, page) = ds.layout_and_page("set_parameter")?;
            page.set_param(layout, i, &value)
        })
    }

    /// Store one row given in column order; `row` past the end grows the table.
    pub fn set_row_values(&mut self, row: usize, values: &[Value]) -> Result<()> {
        self.track(|ds| {
            ds.require_state(&PAGE_EDIT_STATES, "set_row_values")?;
            let width = ds.layout.columns().len();
            if values.len() != width {
                bail!(SddsError::Usage(format!(
                    "row has {} values, layout has {} columns",
                    values.len(),
                    width
                )));
            }
            let page = ds.page_mut("set_row_values")?;
            for (col, v) in values.iter().enumerate() {
                page.table.set_cell(row, col, v)?;
            }
            Ok(())
        })
    }

    pub fn set_column(&mut self, name: &str, data: ColumnBuffer) -> Result<()> {
        self.track(|ds| {
            ds.require_state(&PAGE_EDIT_STATES, "set_column")?;
            let i = definition_index(&ds.layout, DefKind::Column, name)?;
            ds.page_mut("set_column")?.table.set_column(i, data)
        })
    }

    pub fn set_array(&mut self, name: &str, data: ArrayData) -> Result<()> {
        self.track(|ds| {
            ds.require_state(&PAGE_EDIT_STATES, "set_array")?;
            let i = definition_index(&ds.layout, DefKind::Array, name)?;
            let (layout, page) = ds.layout_and_page("set_array")?;
            page.set_array(layout, i, data)
        })
    }

    /// Mark every row of the page in or out of interest.
    pub fn set_row_flags(&mut self, on: bool) -> Result<()> {
        self.track(|ds| {
            ds.page_mut("set_row_flags")?.table.set_all_flags(on);
            Ok(())
        })
    }

    /// Rows out of interest are not written.
    pub fn set_row_of_interest(&mut self, row: usize, on: bool) -> Result<()> {
        self.track(|ds| ds.page_mut("set_row_of_interest")?.table.set_flag(row, on))
    }

    // ---------- output ----------

    pub fn write_page(&mut self) -> Result<()> {
        self.track(|ds| {
            ds.require_access(Access::Write, "write_page")?;
            ds.require_state(&[DatasetState::PageActive], "write_page")?;
            if ds.page_on_stream {
                bail!(SddsError::Usage(format!(
                    "page {} is already on the stream; use update_page",
                    ds.page_number
                )));
            }
            ds.emit_page()?;
            ds.state = DatasetState::PageClosed;
            Ok(())
        })
    }

    /// Write the rows added since the last write or update and bring the
    /// count field up to date. An unwritten page is written whole.
    pub fn update_page(&mut self) -> Result<()> {
        self.track(|ds| ds.update_page_inner())
    }

    /// `update_page`, then drop the rows from memory. Row indices restart at 0.
    pub fn flush_table(&mut self) -> Result<()> {
        self.track(|ds| {
            ds.update_page_inner()?;
            if let Some(page) = ds.page.as_mut() {
                page.table.clear();
            }
            ds.table_cursor = 0;
            Ok(())
        })
    }

    /// Push buffered output down to the stream.
    pub fn flush(&mut self) -> Result<()> {
        self.track(|ds| ds.channel()?.flush())
    }

    fn update_page_inner(&mut self) -> Result<()> {
        self.require_access(Access::Write, "update_page")?;
        self.require_state(&PAGE_EDIT_STATES, "update_page")?;
        if self.page.is_none() {
            bail!(SddsError::Usage("update_page needs a started page".into()));
        }
        if !self.page_on_stream {
            self.emit_page()?;
            self.state = DatasetState::PageClosed;
            return Ok(());
        }
        let mode = self.layout.data_mode.clone();
        if mode.column_major {
            bail!(SddsError::Usage("column-major pages cannot be updated in place".into()));
        }
        let (Some(ch), Some(codec), Some(page)) = (self.ch.as_mut(), self.codec.as_mut(), self.page.as_ref()) else {
            bail!(SddsError::Usage("dataset has no open stream".into()));
        };
        let rows = page.table.selected_from(self.table_cursor);
        let added = rows.len() as u64;
        let total = self.page_rows_written + added;

        let patch_to = match mode.row_count_policy() {
            RowCountPolicy::Suppressed => None,
            RowCountPolicy::FixedIncrement if total < self.count_value => None,
            RowCountPolicy::FixedIncrement => Some(fixed_row_boundary(total, self.cfg.fixed_row_increment)),
            RowCountPolicy::Variable if added == 0 => None,
            RowCountPolicy::Variable => Some(total),
        };
        if patch_to.is_some() && (!ch.seekable() || self.count_offset.is_none()) {
            bail!(SddsError::Usage(format!(
                "row count of page {} cannot be patched on a {} stream",
                self.page_number,
                ch.kind()
            )));
        }

        codec.write_rows(ch, &self.layout, &page.table, &rows)?;
        if let (Some(n), Some(off)) = (patch_to, self.count_offset) {
            let bytes = codec.encode_count(n)?;
            ch.patch(off, &bytes)?;
            self.count_value = n;
        }
        self.table_cursor = page.table.rows();
        self.page_rows_written = total;
        self.state = DatasetState::PageClosed;
        record_page_update(added);
        debug!(
            "dataset: page {} updated (+{} rows, {} total, count field {})",
            self.page_number, added, total, self.count_value
        );
        Ok(())
    }

    /// Write the page head and every selected row.
    fn emit_page(&mut self) -> Result<()> {
        let (Some(ch), Some(codec), Some(page)) = (self.ch.as_mut(), self.codec.as_mut(), self.page.as_ref()) else {
            bail!(SddsError::Usage("write_page needs a started page and a written layout".into()));
        };
        let mode = &self.layout.data_mode;
        let rows = page.table.selected_from(0);
        let n = rows.len() as u64;
        let count = if mode.fixed_row_count && ch.seekable() && !mode.column_major {
            fixed_row_boundary(n, self.cfg.fixed_row_increment)
        } else {
            n
        };

        let start = ch.tell();
        let count_offset = codec.write_page_head(ch, &self.layout, page, self.page_number, count)?;
        codec.write_rows(ch, &self.layout, &page.table, &rows)?;
        if self.page_offsets.len() < self.page_number as usize {
            self.page_offsets.push(start);
        }

        self.count_offset = count_offset;
        self.count_value = count;
        self.page_rows_written = n;
        self.table_cursor = page.table.rows();
        self.page_on_stream = true;
        record_page_written(n);
        debug!("dataset: page {} written ({} rows, count field {})", self.page_number, n, count);
        Ok(())
    }
}
