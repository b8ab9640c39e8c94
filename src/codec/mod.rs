//! codec — page encode/decode for both encodings.
//!
//! - rows.rs   — shared row driver: limits, `last_rows` window, recovery classification.
//! - sparse.rs — `ReadOptions`, sparse selection and per-interval statistics.
//! - text.rs   — ascii pages.
//! - binary.rs — binary pages (either byte order, row- or column-major).
//!
//! Within a page, parameters always precede arrays and arrays precede rows.

use anyhow::Result;

use crate::layout::{Encoding, Layout};
use crate::page::{PageData, RowTable};
use crate::stream::Channel;

pub(crate) mod binary;
pub(crate) mod rows;
pub mod sparse;
pub(crate) mod text;

pub(crate) use rows::{collect_rows, RowLimit, RowSource, RowsOutcome};
pub use sparse::{reduce, ReadOptions, Statistic};

/// One page encoding. Row decoding comes from `RowSource`.
pub(crate) trait PageCodec: RowSource + Send {
    /// Read parameters, arrays and the row count. `None` means no more pages.
    fn read_page_head(&mut self, ch: &mut Channel, layout: &Layout, page: &mut PageData) -> Result<Option<RowLimit>>;

    /// Write everything before the rows. Returns the offset of the row-count
    /// field when one was written.
    fn write_page_head(
        &mut self,
        ch: &mut Channel,
        layout: &Layout,
        page: &PageData,
        page_number: u32,
        count: u64,
    ) -> Result<Option<u64>>;

    /// Write the given table rows, in order.
    fn write_rows(&mut self, ch: &mut Channel, layout: &Layout, table: &RowTable, rows: &[usize]) -> Result<()>;

    /// Bytes of a count field, same width as the one last written.
    fn encode_count(&self, n: u64) -> Result<Vec<u8>>;

    /// Stream offset where the next page starts, read-ahead included.
    fn resume_offset(&self, ch: &Channel) -> u64;

    /// Offset of the row-count field of the page head read last, when it
    /// can be patched in place.
    fn count_offset(&self) -> Option<u64>;

    /// Drop read-ahead state after the stream was repositioned.
    fn reset(&mut self);
}

pub(crate) fn codec_for(layout: &Layout) -> Box<dyn PageCodec> {
    match layout.data_mode.encoding {
        Encoding::Ascii => Box::new(text::TextCodec::new()),
        Encoding::Binary => Box::new(binary::BinaryCodec::new(layout.data_mode.effective_byte_order())),
    }
}
