//! Shared row driver for both page encodings.
//!
//! The codecs only know how to decode one raw row. Everything else lives here:
//! - the row limit taken from the page's count field,
//! - the `last_rows` window (skip ahead when the count is exact, ring buffer otherwise),
//! - sparse selection and statistics (via `Selector`),
//! - classification of row-level failures for auto-recovery.

use anyhow::{bail, Result};
use std::collections::VecDeque;

use super::sparse::{ReadOptions, Selector};
use crate::error::{is_row_recoverable, SddsError};
use crate::layout::Layout;
use crate::page::RowTable;
use crate::stream::Channel;
use crate::types::Value;

/// How many rows a page declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowLimit {
    /// Variable row count: the page holds exactly this many rows.
    Exact(u64),
    /// Fixed-increment count: an upper bound, end of stream ends the page.
    AtMost(u64),
    /// No count written; the encoding delimits the page itself.
    Unbounded,
}

impl RowLimit {
    pub(crate) fn bound(self) -> Option<u64> {
        match self {
            RowLimit::Exact(n) | RowLimit::AtMost(n) => Some(n),
            RowLimit::Unbounded => None,
        }
    }
}

/// Decodes one raw row at a time.
pub(crate) trait RowSource {
    /// Fill `out` with the next row in column order. `Ok(false)` means the
    /// page ended cleanly on a row boundary.
    fn next_row(&mut self, ch: &mut Channel, layout: &Layout, out: &mut Vec<Value>) -> Result<bool>;
}

#[derive(Debug)]
pub(crate) struct RowsOutcome {
    /// Raw rows decoded from the stream (before selection).
    pub raw_rows: u64,
    /// Recoverable failure that stopped the page early, if any.
    pub error: Option<anyhow::Error>,
}

/// Drive `src` until the page ends, materialising the selected rows in `table`.
///
/// Format and truncation failures are returned in the outcome with the rows
/// read so far kept; anything else propagates.
pub(crate) fn collect_rows<S: RowSource + ?Sized>(
    src: &mut S,
    ch: &mut Channel,
    layout: &Layout,
    table: &mut RowTable,
    limit: RowLimit,
    opts: &ReadOptions,
) -> Result<RowsOutcome> {
    opts.validate()?;
    let mut selector = Selector::new(opts);

    let mut skip = 0u64;
    let mut ring: Option<(usize, VecDeque<Vec<Value>>)> = None;
    match (opts.last_rows, limit) {
        (Some(n), RowLimit::Exact(total)) => skip = total.saturating_sub(n as u64),
        (Some(n), _) => ring = Some((n, VecDeque::new())),
        (None, _) => {}
    }

    let width = layout.columns().len();
    let mut raw = 0u64;
    let result: Result<()> = loop {
        if let Some(n) = limit.bound() {
            if raw >= n {
                break Ok(());
            }
        }
        let mut row = Vec::with_capacity(width);
        match src.next_row(ch, layout, &mut row) {
            Ok(true) => {}
            Ok(false) => {
                if let RowLimit::Exact(n) = limit {
                    break Err(anyhow::Error::new(SddsError::Truncation(format!(
                        "page ended after {} of {} rows",
                        raw, n
                    ))));
                }
                break Ok(());
            }
            Err(e) => break Err(e),
        }
        raw += 1;
        if raw <= skip {
            continue;
        }
        if let Some((keep, buf)) = ring.as_mut() {
            if *keep == 0 {
                continue;
            }
            if buf.len() == *keep {
                buf.pop_front();
            }
            buf.push_back(row);
            continue;
        }
        if let Err(e) = selector.accept(row, table) {
            break Err(e);
        }
    };

    if let Some((_, buf)) = ring {
        for row in buf {
            selector.accept(row, table)?;
        }
    }
    selector.finish(table)?;

    match result {
        Ok(()) => Ok(RowsOutcome {
            raw_rows: raw,
            error: None,
        }),
        Err(e) if is_row_recoverable(&e) => Ok(RowsOutcome {
            raw_rows: raw,
            error: Some(e),
        }),
        Err(e) => Err(e),
    }
}

/// Columns carried by physical line `line` of a row spread over `lines` lines.
pub(crate) fn line_columns(columns: usize, lines: usize, line: usize) -> std::ops::Range<usize> {
    (line * columns / lines)..((line + 1) * columns / lines)
}

/// Physical lines actually used per row: never more than there are columns.
pub(crate) fn effective_lines(columns: usize, lines_per_row: u32) -> usize {
    (lines_per_row as usize).min(columns).max(1)
}

/// Reject a second page count patch that no longer fits the written field.
pub(crate) fn ensure_count_fits(n: u64, max: u64, what: &str) -> Result<()> {
    if n > max {
        bail!(SddsError::Usage(format!(
            "row count {} does not fit the {} written for this page",
            n, what
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::sparse::Statistic;
    use crate::layout::{ColumnDefinition, DataMode, Encoding};
    use crate::stream::MemoryStream;
    use crate::types::PrimitiveType;

    /// Yields `total` rows, then either ends or fails.
    struct Fake {
        next: i32,
        total: i32,
        fail: Option<SddsError>,
    }

    impl RowSource for Fake {
        fn next_row(&mut self, _ch: &mut Channel, _l: &Layout, out: &mut Vec<Value>) -> Result<bool> {
            if self.next >= self.total {
                return match self.fail.take() {
                    Some(e) => Err(e.into()),
                    None => Ok(false),
                };
            }
            out.push(Value::Float64(self.next as f64));
            self.next += 1;
            Ok(true)
        }
    }

    fn setup() -> (Layout, RowTable, Channel) {
        let mut l = Layout::new(DataMode::new(Encoding::Binary));
        l.define_column(ColumnDefinition::new("x", PrimitiveType::Float64)).unwrap();
        let t = RowTable::new(&l, 4);
        let ch = Channel::new(Box::new(MemoryStream::new()), None).unwrap();
        (l, t, ch)
    }

    fn fake(total: i32) -> Fake {
        Fake { next: 0, total, fail: None }
    }

    fn xs(t: &RowTable) -> Vec<f64> {
        t.column(0).unwrap().as_slice::<f64>().unwrap().to_vec()
    }

    #[test]
    fn exact_limit_stops_and_short_page_truncates() {
        let (l, mut t, mut ch) = setup();
        let out = collect_rows(&mut fake(10), &mut ch, &l, &mut t, RowLimit::Exact(4), &ReadOptions::default()).unwrap();
        assert_eq!(out.raw_rows, 4);
        assert!(out.error.is_none());
        assert_eq!(t.rows(), 4);

        let (l, mut t, mut ch) = setup();
        let out = collect_rows(&mut fake(2), &mut ch, &l, &mut t, RowLimit::Exact(5), &ReadOptions::default()).unwrap();
        assert_eq!(t.rows(), 2);
        let e = out.error.unwrap();
        assert_eq!(crate::error::error_kind(&e), crate::error::ErrorKind::Truncation);
    }

    #[test]
    fn upper_bound_ends_cleanly() {
        let (l, mut t, mut ch) = setup();
        let out = collect_rows(&mut fake(3), &mut ch, &l, &mut t, RowLimit::AtMost(500), &ReadOptions::default()).unwrap();
        assert!(out.error.is_none());
        assert_eq!(t.rows(), 3);
    }

    #[test]
    fn last_rows_window_with_and_without_count() {
        let opts = ReadOptions::default().with_last_rows(3);
        let (l, mut t, mut ch) = setup();
        collect_rows(&mut fake(8), &mut ch, &l, &mut t, RowLimit::Exact(8), &opts).unwrap();
        assert_eq!(xs(&t), vec![5.0, 6.0, 7.0]);

        let (l, mut t, mut ch) = setup();
        collect_rows(&mut fake(8), &mut ch, &l, &mut t, RowLimit::Unbounded, &opts).unwrap();
        assert_eq!(xs(&t), vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn window_then_sparse_then_statistic() {
        let opts = ReadOptions::sparse(2, 0)
            .with_last_rows(4)
            .with_statistic(Statistic::Average);
        let (l, mut t, mut ch) = setup();
        collect_rows(&mut fake(10), &mut ch, &l, &mut t, RowLimit::Exact(10), &opts).unwrap();
        assert_eq!(xs(&t), vec![6.5, 8.5]);
    }

    #[test]
    fn non_row_errors_propagate() {
        let (l, mut t, mut ch) = setup();
        let mut src = Fake {
            next: 0,
            total: 1,
            fail: Some(SddsError::Allocation("boom".into())),
        };
        assert!(collect_rows(&mut src, &mut ch, &l, &mut t, RowLimit::Unbounded, &ReadOptions::default()).is_err());
    }

    #[test]
    fn line_distribution() {
        assert_eq!(effective_lines(5, 2), 2);
        assert_eq!(effective_lines(1, 3), 1);
        assert_eq!(effective_lines(0, 1), 1);
        assert_eq!(line_columns(5, 2, 0), 0..2);
        assert_eq!(line_columns(5, 2, 1), 2..5);
    }
}
