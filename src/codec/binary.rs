//! Binary page codec.
//!
//! Page layout: row count (i32, or `i32::MIN` then an i64), the non-fixed
//! parameters, each array as its dimensions (i32 each) followed by the
//! elements, then the rows. Rows are row-major unless the layout declares
//! column-major order. Strings are an i32 byte length plus the raw bytes.
//! Every multi-byte field is in the layout's declared byte order.

use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};

use super::rows::{ensure_count_fits, RowLimit, RowSource};
use super::PageCodec;
use crate::consts::{MAX_PLAUSIBLE_ROWS, READ_RESERVE_ELEMENTS, ROW_COUNT_SENTINEL, STRING_READ_CHUNK};
use crate::error::SddsError;
use crate::layout::{Layout, RowCountPolicy};
use crate::page::{ArrayData, ColumnBuffer, PageData, RowTable};
use crate::stream::Channel;
use crate::types::{ByteOrder, PrimitiveType, Value};
use crate::util::try_reserve;

const WRITE_CHUNK: usize = 64 * 1024;

/// Column-major rows are loaded as a block, then handed out one by one.
struct ColumnBlock {
    columns: Vec<ColumnBuffer>,
    next: usize,
}

pub(crate) struct BinaryCodec {
    order: ByteOrder,
    limit: RowLimit,
    /// Width of the count field last written: true for sentinel + i64.
    wide_count: bool,
    /// Offset of the count field of the page head read last.
    count_offset: Option<u64>,
    block: Option<ColumnBlock>,
}

impl BinaryCodec {
    pub(crate) fn new(order: ByteOrder) -> Self {
        Self {
            order,
            limit: RowLimit::Exact(0),
            wide_count: false,
            count_offset: None,
            block: None,
        }
    }

    // ---------- primitives ----------

    fn decode_i32(&self, b: &[u8]) -> i32 {
        match self.order {
            ByteOrder::Big => BigEndian::read_i32(b),
            ByteOrder::Little => LittleEndian::read_i32(b),
        }
    }

    fn read_i32(&self, ch: &mut Channel) -> Result<i32> {
        Ok(match self.order {
            ByteOrder::Big => ch.read_i32::<BigEndian>()?,
            ByteOrder::Little => ch.read_i32::<LittleEndian>()?,
        })
    }

    fn read_i64(&self, ch: &mut Channel) -> Result<i64> {
        Ok(match self.order {
            ByteOrder::Big => ch.read_i64::<BigEndian>()?,
            ByteOrder::Little => ch.read_i64::<LittleEndian>()?,
        })
    }

    fn put_i32(&self, out: &mut Vec<u8>, v: i32) -> Result<()> {
        match self.order {
            ByteOrder::Big => out.write_i32::<BigEndian>(v)?,
            ByteOrder::Little => out.write_i32::<LittleEndian>(v)?,
        }
        Ok(())
    }

    fn put_i64(&self, out: &mut Vec<u8>, v: i64) -> Result<()> {
        match self.order {
            ByteOrder::Big => out.write_i64::<BigEndian>(v)?,
            ByteOrder::Little => out.write_i64::<LittleEndian>(v)?,
        }
        Ok(())
    }

    /// Read one value. With `boundary`, a clean end of stream before the
    /// first byte yields `None`; any other short read is a truncation.
    fn read_value_at(&self, ch: &mut Channel, ty: PrimitiveType, boundary: bool) -> Result<Option<Value>> {
        let size = ty.size().unwrap_or(4);
        let mut head = [0u8; 16];
        let b = &mut head[..size];
        let got = ch.read_exact_or_eof(b)?;
        if got == 0 && boundary {
            return Ok(None);
        }
        if got < size {
            bail!(SddsError::Truncation(format!(
                "stream ended inside a {} value ({} of {} bytes)",
                ty, got, size
            )));
        }
        if ty != PrimitiveType::String {
            if !self.order.is_native() {
                ty.swap_in_place(b);
            }
            return Value::from_ne_bytes(ty, b).map(Some);
        }
        let len = self.decode_i32(b);
        if len < 0 {
            bail!(SddsError::Format(format!("negative string length {}", len)));
        }
        let bytes = read_string_bytes(ch, len as usize)?;
        let s = String::from_utf8(bytes).map_err(|e| {
            anyhow::Error::new(SddsError::Format(format!(
                "string value is not valid UTF-8 (byte {})",
                e.utf8_error().valid_up_to()
            )))
        })?;
        Ok(Some(Value::String(s)))
    }

    fn read_value(&self, ch: &mut Channel, ty: PrimitiveType) -> Result<Value> {
        match self.read_value_at(ch, ty, false)? {
            Some(v) => Ok(v),
            None => bail!(SddsError::Truncation(format!("stream ended before a {} value", ty))),
        }
    }

    fn put_value(&self, out: &mut Vec<u8>, v: &Value) -> Result<()> {
        match v {
            Value::String(s) => {
                let len = i32::try_from(s.len()).map_err(|_| {
                    anyhow::Error::new(SddsError::Format(format!("string of {} bytes is too long", s.len())))
                })?;
                self.put_i32(out, len)?;
                out.extend_from_slice(s.as_bytes());
            }
            other => {
                let start = out.len();
                other.extend_ne_bytes(out);
                if !self.order.is_native() {
                    other.ty().swap_in_place(&mut out[start..]);
                }
            }
        }
        Ok(())
    }

    /// Row count at a page boundary: `None` at a clean end of stream.
    fn read_count(&mut self, ch: &mut Channel) -> Result<Option<u64>> {
        let mut b = [0u8; 4];
        let got = ch.read_exact_or_eof(&mut b)?;
        if got == 0 {
            return Ok(None);
        }
        if got < b.len() {
            bail!(SddsError::Truncation(format!("stream ended inside a row count ({} bytes)", got)));
        }
        let v = self.decode_i32(&b);
        self.wide_count = v == ROW_COUNT_SENTINEL;
        let n = if v == ROW_COUNT_SENTINEL {
            let wide = self.read_i64(ch).context("reading 64-bit row count")?;
            if wide < 0 {
                bail!(SddsError::Format(format!("negative row count {}", wide)));
            }
            wide as u64
        } else if v < 0 {
            bail!(SddsError::Format(format!("negative row count {}", v)));
        } else {
            v as u64
        };
        Ok(Some(n))
    }

    fn load_block(&mut self, ch: &mut Channel, layout: &Layout) -> Result<()> {
        let n = self.limit.bound().unwrap_or(0) as usize;
        let mut columns = Vec::with_capacity(layout.columns().len());
        for def in layout.columns() {
            let mut buf = ColumnBuffer::new(def.ty());
            buf.reserve(n.min(READ_RESERVE_ELEMENTS))?;
            for _ in 0..n {
                let v = self
                    .read_value(ch, def.ty())
                    .with_context(|| format!("column '{}'", def.name()))?;
                buf.push(&v)?;
            }
            columns.push(buf);
        }
        self.block = Some(ColumnBlock { columns, next: 0 });
        Ok(())
    }
}

impl RowSource for BinaryCodec {
    fn next_row(&mut self, ch: &mut Channel, layout: &Layout, out: &mut Vec<Value>) -> Result<bool> {
        if layout.data_mode.column_major {
            if self.block.is_none() {
                self.load_block(ch, layout)?;
            }
            let Some(block) = self.block.as_mut() else {
                return Ok(false);
            };
            let r = block.next;
            for c in &block.columns {
                match c.get(r) {
                    Some(v) => out.push(v),
                    None => return Ok(false),
                }
            }
            block.next += 1;
            return Ok(true);
        }
        for (k, def) in layout.columns().iter().enumerate() {
            let v = self
                .read_value_at(ch, def.ty(), k == 0)
                .with_context(|| format!("column '{}'", def.name()))?;
            match v {
                Some(v) => out.push(v),
                None => return Ok(false),
            }
        }
        Ok(true)
    }
}

impl PageCodec for BinaryCodec {
    fn read_page_head(&mut self, ch: &mut Channel, layout: &Layout, page: &mut PageData) -> Result<Option<RowLimit>> {
        self.block = None;
        self.count_offset = Some(ch.tell());
        let Some(n) = self.read_count(ch)? else {
            return Ok(None);
        };
        if n > MAX_PLAUSIBLE_ROWS {
            warn!("binary page: implausible row count {}, treating as end of data", n);
            return Ok(None);
        }
        for (i, def) in layout.parameters().iter().enumerate() {
            if def.fixed_value.is_some() {
                continue;
            }
            let v = self
                .read_value(ch, def.ty())
                .with_context(|| format!("parameter '{}'", def.name()))?;
            page.params[i] = Some(v);
        }
        for (i, def) in layout.arrays().iter().enumerate() {
            let mut dims = Vec::with_capacity(def.dimensions);
            for _ in 0..def.dimensions {
                let d = self
                    .read_i32(ch)
                    .with_context(|| format!("dimensions of array '{}'", def.name()))?;
                if d < 0 {
                    bail!(SddsError::Format(format!("array '{}' has negative dimension {}", def.name(), d)));
                }
                dims.push(d as usize);
            }
            let (mut data, n) = ArrayData::for_reading(def.ty(), dims)?;
            for _ in 0..n {
                let v = self
                    .read_value(ch, def.ty())
                    .with_context(|| format!("array '{}'", def.name()))?;
                data.values.push(&v)?;
            }
            page.arrays[i] = Some(data);
        }
        self.limit = match layout.data_mode.row_count_policy() {
            RowCountPolicy::FixedIncrement if !layout.data_mode.column_major => RowLimit::AtMost(n),
            _ => RowLimit::Exact(n),
        };
        debug!("binary page head read, rows {:?}", self.limit);
        Ok(Some(self.limit))
    }

    fn write_page_head(
        &mut self,
        ch: &mut Channel,
        layout: &Layout,
        page: &PageData,
        _page_number: u32,
        count: u64,
    ) -> Result<Option<u64>> {
        self.wide_count = count > i32::MAX as u64;
        let offset = ch.tell();
        let mut out = self.encode_count(count)?;
        for (i, def) in layout.parameters().iter().enumerate() {
            if def.fixed_value.is_some() {
                continue;
            }
            let v = page.params[i].clone().unwrap_or_else(|| Value::default_of(def.ty()));
            self.put_value(&mut out, &v)?;
        }
        for (i, def) in layout.arrays().iter().enumerate() {
            match &page.arrays[i] {
                Some(a) => {
                    for d in &a.dims {
                        let d = i32::try_from(*d).map_err(|_| {
                            anyhow::Error::new(SddsError::Format(format!(
                                "dimension {} of array '{}' is too large",
                                d,
                                def.name()
                            )))
                        })?;
                        self.put_i32(&mut out, d)?;
                    }
                    for v in a.values.iter_values() {
                        self.put_value(&mut out, &v)?;
                    }
                }
                None => {
                    for _ in 0..def.dimensions {
                        self.put_i32(&mut out, 0)?;
                    }
                }
            }
        }
        ch.write_bytes(&out)?;
        Ok(Some(offset))
    }

    fn write_rows(&mut self, ch: &mut Channel, layout: &Layout, table: &RowTable, rows: &[usize]) -> Result<()> {
        let mut out: Vec<u8> = Vec::new();
        let cell = |c: &ColumnBuffer, r: usize| -> Result<Value> {
            match c.get(r) {
                Some(v) => Ok(v),
                None => bail!(SddsError::Usage(format!("row {} is outside the table", r))),
            }
        };
        if layout.data_mode.column_major {
            for c in table.columns() {
                for &r in rows {
                    self.put_value(&mut out, &cell(c, r)?)?;
                    if out.len() >= WRITE_CHUNK {
                        ch.write_bytes(&out)?;
                        out.clear();
                    }
                }
            }
        } else {
            for &r in rows {
                for c in table.columns() {
                    self.put_value(&mut out, &cell(c, r)?)?;
                }
                if out.len() >= WRITE_CHUNK {
                    ch.write_bytes(&out)?;
                    out.clear();
                }
            }
        }
        ch.write_bytes(&out)
    }

    fn encode_count(&self, n: u64) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(12);
        if self.wide_count {
            let wide = i64::try_from(n).map_err(|_| {
                anyhow::Error::new(SddsError::Format(format!("row count {} is out of range", n)))
            })?;
            self.put_i32(&mut out, ROW_COUNT_SENTINEL)?;
            self.put_i64(&mut out, wide)?;
        } else {
            ensure_count_fits(n, i32::MAX as u64, "32-bit count field")?;
            self.put_i32(&mut out, n as i32)?;
        }
        Ok(out)
    }

    fn resume_offset(&self, ch: &Channel) -> u64 {
        ch.tell()
    }

    fn count_offset(&self) -> Option<u64> {
        self.count_offset
    }

    fn reset(&mut self) {
        self.block = None;
    }
}

/// Read `len` string bytes in bounded steps, so a corrupt length costs no
/// more memory than the bytes the stream actually holds.
fn read_string_bytes(ch: &mut Channel, len: usize) -> Result<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::new();
    try_reserve(&mut bytes, len.min(STRING_READ_CHUNK), "string value")?;
    while bytes.len() < len {
        let start = bytes.len();
        let step = (len - start).min(STRING_READ_CHUNK);
        try_reserve(&mut bytes, step, "string value")?;
        bytes.resize(start + step, 0);
        let got = ch.read_exact_or_eof(&mut bytes[start..])?;
        if got < step {
            bail!(SddsError::Truncation(format!(
                "stream ended inside a string value ({} of {} bytes)",
                start + got,
                len
            )));
        }
    }
    Ok(bytes)
}
