//! Text (ascii) page codec.
//!
//! Page layout on the wire:
//! - a blank line before pages after the first when row counts are suppressed,
//! - the marker comment `! page number N`,
//! - one line per non-fixed parameter,
//! - per array: a dimension line, then the elements six per line,
//! - the row count, right-aligned in a 20-character field,
//! - the rows, each spread over `lines_per_row` physical lines.

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use std::fmt::Write as _;

use super::rows::{effective_lines, line_columns, RowLimit, RowSource};
use super::PageCodec;
use crate::consts::{MAX_PLAUSIBLE_ROWS, PAGE_MARKER, TEXT_ARRAY_ITEMS_PER_LINE, TEXT_ROW_COUNT_WIDTH};
use crate::error::SddsError;
use crate::layout::{ColumnDefinition, Layout, RowCountPolicy};
use crate::page::{ArrayData, PageData, RowTable};
use crate::stream::Channel;
use crate::text::{encode_token, escape, format_value, is_blank_or_comment, split_tokens, strip_comment, try_unescape, LineCursor};
use crate::types::{PrimitiveType, Value};

const WRITE_CHUNK: usize = 64 * 1024;

pub(crate) struct TextCodec {
    /// Line read ahead and handed back, with the offset it started at.
    pending: Option<(u64, String)>,
    /// Offset of the line most recently returned by `next_line`.
    line_offset: u64,
    count_offset: Option<u64>,
    limit: RowLimit,
}

impl TextCodec {
    pub(crate) fn new() -> Self {
        Self {
            pending: None,
            line_offset: 0,
            count_offset: None,
            limit: RowLimit::Unbounded,
        }
    }

    fn push_back(&mut self, line: String) {
        self.pending = Some((self.line_offset, line));
    }

    fn next_line(&mut self, ch: &mut Channel) -> Result<Option<String>> {
        if let Some((off, l)) = self.pending.take() {
            self.line_offset = off;
            return Ok(Some(l));
        }
        self.line_offset = ch.tell();
        let mut line = String::new();
        if ch.read_line(&mut line)? {
            Ok(Some(line))
        } else {
            Ok(None)
        }
    }

    /// Next line carrying data (blank and comment lines skipped).
    fn next_data_line(&mut self, ch: &mut Channel) -> Result<Option<String>> {
        while let Some(line) = self.next_line(ch)? {
            if !is_blank_or_comment(&line) {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    fn require_data_line(&mut self, ch: &mut Channel, what: &str) -> Result<String> {
        match self.next_data_line(ch)? {
            Some(l) => Ok(l),
            None => bail!(SddsError::Truncation(format!("stream ended before {}", what))),
        }
    }

    /// Position on the first line of the next page. False at end of data.
    fn seek_page_start(&mut self, ch: &mut Channel) -> Result<bool> {
        let mut seen_marker = false;
        loop {
            let Some(line) = self.next_line(ch)? else {
                return Ok(seen_marker);
            };
            if line.trim_start().starts_with(PAGE_MARKER) {
                if seen_marker {
                    // empty page: the next marker belongs to the following page
                    self.push_back(line);
                    return Ok(true);
                }
                seen_marker = true;
                continue;
            }
            if is_blank_or_comment(&line) {
                continue;
            }
            self.push_back(line);
            return Ok(true);
        }
    }

    /// First physical line of a row; `None` when the page ends here.
    fn first_row_line(&mut self, ch: &mut Channel) -> Result<Option<String>> {
        loop {
            let Some(line) = self.next_line(ch)? else {
                return Ok(None);
            };
            let t = line.trim_start();
            if t.is_empty() {
                if self.limit == RowLimit::Unbounded {
                    return Ok(None);
                }
                continue;
            }
            if t.starts_with('!') {
                if t.starts_with(PAGE_MARKER) && !matches!(self.limit, RowLimit::Exact(_)) {
                    self.push_back(line);
                    return Ok(None);
                }
                continue;
            }
            return Ok(Some(line));
        }
    }

    fn read_array(&mut self, ch: &mut Channel, name: &str, ty: PrimitiveType, dimensions: usize) -> Result<ArrayData> {
        let line = self.require_data_line(ch, &format!("dimensions of array '{}'", name))?;
        let toks = split_tokens(&line);
        if toks.len() < dimensions {
            bail!(SddsError::Format(format!(
                "array '{}' needs {} dimensions, line has {}",
                name,
                dimensions,
                toks.len()
            )));
        }
        let mut dims = Vec::with_capacity(dimensions);
        for t in &toks[..dimensions] {
            let d: usize = t.parse().map_err(|_| {
                anyhow::Error::new(SddsError::Format(format!("invalid dimension '{}' for array '{}'", t, name)))
            })?;
            dims.push(d);
        }
        let (mut data, n) = ArrayData::for_reading(ty, dims)?;
        let mut k = 0;
        while k < n {
            let line = self.require_data_line(ch, &format!("element {} of array '{}'", k, name))?;
            let mut cur = LineCursor::new(&line);
            while k < n {
                let Some((raw, _)) = cur.next_raw() else {
                    break;
                };
                data.values.push(&decode_cell(ty, raw)?)?;
                k += 1;
            }
        }
        Ok(data)
    }

    fn read_count(&mut self, ch: &mut Channel) -> Result<Option<u64>> {
        let Some(line) = self.next_data_line(ch)? else {
            bail!(SddsError::Format("row count missing".into()));
        };
        let first = split_tokens(&line).into_iter().next().unwrap_or_default();
        let n: u64 = first.parse().map_err(|_| {
            anyhow::Error::new(SddsError::Format(format!("invalid row count '{}'", line.trim())))
        })?;
        if n > MAX_PLAUSIBLE_ROWS {
            warn!("text page: implausible row count {}, treating as end of data", n);
            return Ok(None);
        }
        // only a full-width field can be patched in place
        if line.len() == TEXT_ROW_COUNT_WIDTH {
            self.count_offset = Some(self.line_offset);
        }
        Ok(Some(n))
    }
}

impl RowSource for TextCodec {
    fn next_row(&mut self, ch: &mut Channel, layout: &Layout, out: &mut Vec<Value>) -> Result<bool> {
        let cols = layout.columns();
        if cols.is_empty() {
            return Ok(self.limit != RowLimit::Unbounded);
        }
        let lines = effective_lines(cols.len(), layout.data_mode.lines_per_row);
        for j in 0..lines {
            let line = if j == 0 {
                match self.first_row_line(ch)? {
                    Some(l) => l,
                    None => return Ok(false),
                }
            } else {
                match self.next_line(ch)? {
                    Some(l) => l,
                    None => bail!(SddsError::Truncation(format!(
                        "stream ended on line {} of {} of a row",
                        j + 1,
                        lines
                    ))),
                }
            };
            parse_fields(&line, &cols[line_columns(cols.len(), lines, j)], out)
                .with_context(|| format!("row line {} of {}", j + 1, lines))?;
        }
        Ok(true)
    }
}

impl PageCodec for TextCodec {
    fn read_page_head(&mut self, ch: &mut Channel, layout: &Layout, page: &mut PageData) -> Result<Option<RowLimit>> {
        self.count_offset = None;
        if !self.seek_page_start(ch)? {
            return Ok(None);
        }
        for (i, def) in layout.parameters().iter().enumerate() {
            if def.fixed_value.is_some() {
                continue;
            }
            let line = self.require_data_line(ch, &format!("parameter '{}'", def.name()))?;
            let v = parse_parameter(def.ty(), &line).with_context(|| format!("parameter '{}'", def.name()))?;
            page.params[i] = Some(v);
        }
        for (i, def) in layout.arrays().iter().enumerate() {
            let data = self.read_array(ch, def.name(), def.ty(), def.dimensions)?;
            page.arrays[i] = Some(data);
        }
        self.limit = match layout.data_mode.row_count_policy() {
            RowCountPolicy::Suppressed => RowLimit::Unbounded,
            RowCountPolicy::FixedIncrement => match self.read_count(ch)? {
                Some(n) => RowLimit::AtMost(n),
                None => return Ok(None),
            },
            RowCountPolicy::Variable => match self.read_count(ch)? {
                Some(n) => RowLimit::Exact(n),
                None => return Ok(None),
            },
        };
        debug!("text page head read, rows {:?}", self.limit);
        Ok(Some(self.limit))
    }

    fn write_page_head(
        &mut self,
        ch: &mut Channel,
        layout: &Layout,
        page: &PageData,
        page_number: u32,
        count: u64,
    ) -> Result<Option<u64>> {
        let policy = layout.data_mode.row_count_policy();
        let mut s = String::new();
        if page_number > 1 && policy == RowCountPolicy::Suppressed {
            s.push('\n');
        }
        let _ = writeln!(s, "{} {}", PAGE_MARKER, page_number);
        for (i, def) in layout.parameters().iter().enumerate() {
            if def.fixed_value.is_some() {
                continue;
            }
            let v = page.params[i].clone().unwrap_or_else(|| Value::default_of(def.ty()));
            s.push_str(&encode_cell(&v, def.def.format_string.as_deref()));
            s.push('\n');
        }
        for (i, def) in layout.arrays().iter().enumerate() {
            match &page.arrays[i] {
                Some(a) => {
                    let dims: Vec<String> = a.dims.iter().map(|d| d.to_string()).collect();
                    s.push_str(&dims.join(" "));
                    s.push('\n');
                    let cells: Vec<String> = a
                        .values
                        .iter_values()
                        .map(|v| encode_cell(&v, def.def.format_string.as_deref()))
                        .collect();
                    for chunk in cells.chunks(TEXT_ARRAY_ITEMS_PER_LINE) {
                        s.push_str(&chunk.join(" "));
                        s.push('\n');
                    }
                }
                None => {
                    s.push_str(&vec!["0"; def.dimensions].join(" "));
                    s.push('\n');
                }
            }
        }
        ch.write_str(&s)?;
        if policy == RowCountPolicy::Suppressed {
            return Ok(None);
        }
        let offset = ch.tell();
        let mut c = self.encode_count(count)?;
        c.push(b'\n');
        ch.write_bytes(&c)?;
        Ok(Some(offset))
    }

    fn write_rows(&mut self, ch: &mut Channel, layout: &Layout, table: &RowTable, rows: &[usize]) -> Result<()> {
        let cols = layout.columns();
        if cols.is_empty() {
            return Ok(());
        }
        let lines = effective_lines(cols.len(), layout.data_mode.lines_per_row);
        let mut s = String::new();
        for &r in rows {
            for j in 0..lines {
                let range = line_columns(cols.len(), lines, j);
                let mut first = true;
                for c in range {
                    let def = &cols[c];
                    let Some(v) = table.cell(r, c) else {
                        bail!(SddsError::Usage(format!("row {} is outside the table", r)));
                    };
                    if !first {
                        s.push(' ');
                    }
                    first = false;
                    let cell = if def.field_length == 0 {
                        encode_cell(&v, def.def.format_string.as_deref())
                    } else {
                        encode_fixed(&v, def)?
                    };
                    s.push_str(&cell);
                }
                s.push('\n');
            }
            if s.len() >= WRITE_CHUNK {
                ch.write_str(&s)?;
                s.clear();
            }
        }
        ch.write_str(&s)
    }

    fn encode_count(&self, n: u64) -> Result<Vec<u8>> {
        Ok(format!("{:>width$}", n, width = TEXT_ROW_COUNT_WIDTH).into_bytes())
    }

    fn resume_offset(&self, ch: &Channel) -> u64 {
        match &self.pending {
            Some((off, _)) => *off,
            None => ch.tell(),
        }
    }

    fn count_offset(&self) -> Option<u64> {
        self.count_offset
    }

    fn reset(&mut self) {
        self.pending = None;
        self.limit = RowLimit::Unbounded;
    }
}

// ---------- cells ----------

/// Token written for a single character: escaped, never quoted.
fn encode_char(b: u8) -> String {
    match b {
        b'!' => "\\!".into(),
        b'\\' => "\\\\".into(),
        b'"' => "\\\"".into(),
        0x21..=0x7e => (b as char).to_string(),
        _ => format!("\\{:03o}", b),
    }
}

fn decode_char(raw: &str) -> Result<Value> {
    let b = raw.as_bytes();
    match b {
        [] => bail!(SddsError::Format("empty character value".into())),
        [b'\\', rest @ ..] if !rest.is_empty() => {
            if (b'0'..=b'7').contains(&rest[0]) {
                let mut v: u32 = 0;
                for d in rest.iter().take(3).take_while(|d| (b'0'..=b'7').contains(*d)) {
                    v = v * 8 + (d - b'0') as u32;
                }
                return Ok(Value::Char((v & 0xff) as u8));
            }
            Ok(Value::Char(match rest[0] {
                b'n' => b'\n',
                b't' => b'\t',
                b'r' => b'\r',
                c => c,
            }))
        }
        [c, ..] => Ok(Value::Char(*c)),
    }
}

fn encode_cell(v: &Value, fmt: Option<&str>) -> String {
    match v {
        Value::String(s) => encode_token(s),
        Value::Char(c) => encode_char(*c),
        other => format_value(other, fmt),
    }
}

/// Decode a raw (still escaped, unquoted) token.
fn decode_cell(ty: PrimitiveType, raw: &str) -> Result<Value> {
    match ty {
        PrimitiveType::String => Ok(Value::String(try_unescape(raw)?)),
        PrimitiveType::Char => decode_char(raw),
        _ => Value::parse(ty, raw),
    }
}

fn encode_fixed(v: &Value, def: &ColumnDefinition) -> Result<String> {
    let w = def.field_length.unsigned_abs() as usize;
    let s = match v {
        Value::String(s) => escape(s),
        Value::Char(c) => encode_char(*c),
        other => format_value(other, def.def.format_string.as_deref()).trim().to_string(),
    };
    if s.len() > w {
        bail!(SddsError::Format(format!(
            "value '{}' does not fit the {}-character field of column '{}'",
            s,
            w,
            def.name()
        )));
    }
    Ok(if v.ty().is_numeric() {
        format!("{:>w$}", s)
    } else {
        format!("{:<w$}", s)
    })
}

fn decode_fixed(raw: &str, def: &ColumnDefinition) -> Result<Value> {
    match def.ty() {
        PrimitiveType::String if def.field_length > 0 => Ok(Value::String(try_unescape(raw)?)),
        PrimitiveType::String => Ok(Value::String(try_unescape(raw.trim())?)),
        PrimitiveType::Char => decode_char(raw.trim()),
        ty => Value::parse(ty, raw.trim()),
    }
}

fn parse_parameter(ty: PrimitiveType, line: &str) -> Result<Value> {
    let t = line.trim();
    match ty {
        PrimitiveType::String => {
            if t.starts_with('"') {
                let mut cur = LineCursor::new(t);
                let raw = cur.next_raw().map(|(raw, _)| raw).unwrap_or_default();
                Ok(Value::String(try_unescape(raw)?))
            } else {
                Ok(Value::String(try_unescape(strip_comment(t).trim())?))
            }
        }
        _ => {
            let mut cur = LineCursor::new(t);
            match cur.next_raw() {
                Some((raw, _)) => decode_cell(ty, raw),
                None => bail!(SddsError::Format(format!("missing {} value", ty))),
            }
        }
    }
}

fn parse_fields(line: &str, defs: &[ColumnDefinition], out: &mut Vec<Value>) -> Result<()> {
    let mut cur = LineCursor::new(line);
    for (k, def) in defs.iter().enumerate() {
        let v = if def.field_length == 0 {
            match cur.next_raw() {
                Some((raw, _)) => decode_cell(def.ty(), raw),
                None => bail!(SddsError::Format(format!(
                    "row line has no value for column '{}'",
                    def.name()
                ))),
            }
        } else {
            if k > 0 {
                cur.skip_separator();
            }
            let raw = cur.take_fixed(def.field_length.unsigned_abs() as usize);
            decode_fixed(raw, def)
        };
        out.push(v.with_context(|| format!("column '{}'", def.name()))?);
    }
    if !cur.at_end() {
        bail!(SddsError::Format(format!(
            "line layout: unexpected '{}' after column '{}'",
            cur.rest().trim(),
            defs.last().map(|d| d.name()).unwrap_or_default()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rows::collect_rows;
    use crate::codec::ReadOptions;
    use crate::layout::{ArrayDefinition, DataMode, Encoding, ParameterDefinition};
    use crate::stream::MemoryStream;

    fn layout() -> Layout {
        let mut l = Layout::new(DataMode::new(Encoding::Ascii));
        l.define_parameter(ParameterDefinition::new("title", PrimitiveType::String)).unwrap();
        l.define_parameter(ParameterDefinition::new("step", PrimitiveType::Int32)).unwrap();
        l.define_array(ArrayDefinition::new("m", PrimitiveType::Float64, 2)).unwrap();
        l.define_column(ColumnDefinition::new("c", PrimitiveType::Char)).unwrap();
        l.define_column(ColumnDefinition::new("s", PrimitiveType::String)).unwrap();
        l.define_column(ColumnDefinition::new("x", PrimitiveType::Float64)).unwrap();
        l
    }

    fn page(l: &Layout) -> PageData {
        let mut p = PageData::new(l, 4).unwrap();
        p.set_param(l, 0, &Value::from("run one")).unwrap();
        p.set_param(l, 1, &Value::Int32(-7)).unwrap();
        let vals: Vec<f64> = (0..8).map(|i| i as f64 * 0.5).collect();
        let a = ArrayData::from_values(vec![2, 4], vals.into()).unwrap();
        p.set_array(l, 0, a).unwrap();
        for (c, s, x) in [(b' ', "a b", 1.25), (b'!', "", -3.0), (b'\t', "q\"uote\\", 1e300)] {
            p.table
                .push_row(&[Value::Char(c), Value::from(s), Value::Float64(x)])
                .unwrap();
        }
        p
    }

    fn write(l: &Layout, p: &PageData) -> (MemoryStream, u64) {
        let mem = MemoryStream::new();
        let mut ch = Channel::new(Box::new(mem.clone()), None).unwrap();
        let mut codec = TextCodec::new();
        let rows: Vec<usize> = (0..p.table.rows()).collect();
        let off = codec
            .write_page_head(&mut ch, l, p, 1, rows.len() as u64)
            .unwrap()
            .unwrap();
        codec.write_rows(&mut ch, l, &p.table, &rows).unwrap();
        ch.flush().unwrap();
        (mem, off)
    }

    fn read(l: &Layout, mem: &MemoryStream) -> (PageData, Option<anyhow::Error>) {
        let mut ch = Channel::new(Box::new(MemoryStream::from_bytes(mem.contents())), None).unwrap();
        let mut codec = TextCodec::new();
        let mut p = PageData::new(l, 4).unwrap();
        let limit = codec.read_page_head(&mut ch, l, &mut p).unwrap().unwrap();
        let out = collect_rows(&mut codec, &mut ch, l, &mut p.table, limit, &ReadOptions::default()).unwrap();
        (p, out.error)
    }

    #[test]
    fn page_round_trip_with_escapes() {
        let l = layout();
        let p = page(&l);
        let (mem, _) = write(&l, &p);
        let text = String::from_utf8(mem.contents()).unwrap();
        assert!(text.starts_with("! page number 1\n\"run one\"\n-7\n2 4\n"));
        assert!(text.contains("\\040 \"a b\""));
        assert!(text.contains("\\! \"\""));

        let (q, err) = read(&l, &mem);
        assert!(err.is_none());
        assert_eq!(q.params, p.params);
        assert_eq!(q.arrays, p.arrays);
        assert_eq!(q.table.rows(), 3);
        for r in 0..3 {
            for c in 0..3 {
                assert_eq!(q.table.cell(r, c), p.table.cell(r, c));
            }
        }
    }

    #[test]
    fn count_field_is_patchable() {
        let l = layout();
        let p = page(&l);
        let (mem, off) = write(&l, &p);
        let bytes = mem.contents();
        let field = &bytes[off as usize..off as usize + TEXT_ROW_COUNT_WIDTH];
        assert_eq!(std::str::from_utf8(field).unwrap().trim(), "3");
        assert_eq!(TextCodec::new().encode_count(12).unwrap().len(), TEXT_ROW_COUNT_WIDTH);
    }

    #[test]
    fn multi_line_rows_and_fixed_width() {
        let mut dm = DataMode::new(Encoding::Ascii);
        dm.lines_per_row = 2;
        let mut l = Layout::new(dm);
        l.define_column(ColumnDefinition::new("a", PrimitiveType::Int32).with_field_length(6)).unwrap();
        l.define_column(ColumnDefinition::new("b", PrimitiveType::String).with_field_length(-8)).unwrap();
        l.define_column(ColumnDefinition::new("c", PrimitiveType::UInt16)).unwrap();
        let mut p = PageData::new(&l, 4).unwrap();
        p.table.push_row(&[Value::Int32(42), Value::from("hi there"), Value::UInt16(9)]).unwrap();
        p.table.push_row(&[Value::Int32(-1), Value::from("x"), Value::UInt16(65535)]).unwrap();
        let (mem, _) = write(&l, &p);
        let text = String::from_utf8(mem.contents()).unwrap();
        assert!(text.contains("\n    42\nhi there 9\n"));
        let (q, err) = read(&l, &mem);
        assert!(err.is_none());
        assert_eq!(q.table.cell(0, 1), Some(Value::from("hi there")));
        assert_eq!(q.table.cell(1, 1), Some(Value::from("x")));
        assert_eq!(q.table.cell(1, 2), Some(Value::UInt16(65535)));
    }

    #[test]
    fn too_wide_value_rejected() {
        let mut l = Layout::new(DataMode::new(Encoding::Ascii));
        l.define_column(ColumnDefinition::new("a", PrimitiveType::Int32).with_field_length(2)).unwrap();
        let mut p = PageData::new(&l, 4).unwrap();
        p.table.push_row(&[Value::Int32(12345)]).unwrap();
        let mut ch = Channel::new(Box::new(MemoryStream::new()), None).unwrap();
        let err = TextCodec::new().write_rows(&mut ch, &l, &p.table, &[0]).unwrap_err();
        assert_eq!(crate::error::error_kind(&err), crate::error::ErrorKind::Format);
    }

    #[test]
    fn suppressed_counts_pages_end_at_blank_line() {
        let mut dm = DataMode::new(Encoding::Ascii);
        dm.no_row_counts = true;
        let mut l = Layout::new(dm);
        l.define_column(ColumnDefinition::new("n", PrimitiveType::Int64)).unwrap();
        let src = "! page number 1\n1\n2\n\n! page number 2\n3\n";
        let mut ch = Channel::new(Box::new(MemoryStream::from_bytes(src.as_bytes().to_vec())), None).unwrap();
        let mut codec = TextCodec::new();
        let mut counts = Vec::new();
        loop {
            let mut p = PageData::new(&l, 4).unwrap();
            let Some(limit) = codec.read_page_head(&mut ch, &l, &mut p).unwrap() else {
                break;
            };
            assert_eq!(limit, RowLimit::Unbounded);
            collect_rows(&mut codec, &mut ch, &l, &mut p.table, limit, &ReadOptions::default()).unwrap();
            counts.push(p.table.rows());
        }
        assert_eq!(counts, vec![2, 1]);
    }

    #[test]
    fn bad_counts() {
        let mut l = Layout::new(DataMode::new(Encoding::Ascii));
        l.define_column(ColumnDefinition::new("n", PrimitiveType::Int32)).unwrap();
        for (src, ok_none) in [("! page number 1\nabc\n", false), ("! page number 1\n99999999999999\n", true)] {
            let mut ch = Channel::new(Box::new(MemoryStream::from_bytes(src.as_bytes().to_vec())), None).unwrap();
            let mut p = PageData::new(&l, 4).unwrap();
            let r = TextCodec::new().read_page_head(&mut ch, &l, &mut p);
            if ok_none {
                assert!(r.unwrap().is_none());
            } else {
                assert_eq!(crate::error::error_kind(&r.unwrap_err()), crate::error::ErrorKind::Format);
            }
        }
    }

    #[test]
    fn missing_value_is_format_error() {
        let mut l = Layout::new(DataMode::new(Encoding::Ascii));
        l.define_column(ColumnDefinition::new("a", PrimitiveType::Int32)).unwrap();
        l.define_column(ColumnDefinition::new("b", PrimitiveType::Int32)).unwrap();
        let src = "3\n1 2\n3\n5 6\n";
        let mut ch = Channel::new(Box::new(MemoryStream::from_bytes(src.as_bytes().to_vec())), None).unwrap();
        let mut codec = TextCodec::new();
        let mut p = PageData::new(&l, 4).unwrap();
        let limit = codec.read_page_head(&mut ch, &l, &mut p).unwrap().unwrap();
        let out = collect_rows(&mut codec, &mut ch, &l, &mut p.table, limit, &ReadOptions::default()).unwrap();
        assert_eq!(p.table.rows(), 1);
        assert_eq!(crate::error::error_kind(&out.error.unwrap()), crate::error::ErrorKind::Format);
    }

    #[test]
    fn leftover_tokens_on_a_row_line_are_rejected() {
        let mut dm = DataMode::new(Encoding::Ascii);
        dm.lines_per_row = 2;
        let mut l = Layout::new(dm);
        l.define_column(ColumnDefinition::new("a", PrimitiveType::Int32)).unwrap();
        l.define_column(ColumnDefinition::new("b", PrimitiveType::Int32)).unwrap();
        for (src, rows, bad) in [("2\n1\n2 ! note\n3\n4\n", 2, false), ("1\n1 2\n3 4\n", 0, true)] {
            let mut ch = Channel::new(Box::new(MemoryStream::from_bytes(src.as_bytes().to_vec())), None).unwrap();
            let mut codec = TextCodec::new();
            let mut p = PageData::new(&l, 4).unwrap();
            let limit = codec.read_page_head(&mut ch, &l, &mut p).unwrap().unwrap();
            let out = collect_rows(&mut codec, &mut ch, &l, &mut p.table, limit, &ReadOptions::default()).unwrap();
            assert_eq!(p.table.rows(), rows, "{src:?}");
            assert_eq!(out.error.is_some(), bad, "{src:?}");
        }
    }

    #[test]
    fn resume_offset_points_at_pushed_back_marker() {
        let mut dm = DataMode::new(Encoding::Ascii);
        dm.no_row_counts = true;
        let mut l = Layout::new(dm);
        l.define_column(ColumnDefinition::new("n", PrimitiveType::Int32)).unwrap();
        let src = "! page number 1\n1\n! page number 2\n2\n";
        let mut ch = Channel::new(Box::new(MemoryStream::from_bytes(src.as_bytes().to_vec())), None).unwrap();
        let mut codec = TextCodec::new();
        let mut p = PageData::new(&l, 4).unwrap();
        let limit = codec.read_page_head(&mut ch, &l, &mut p).unwrap().unwrap();
        collect_rows(&mut codec, &mut ch, &l, &mut p.table, limit, &ReadOptions::default()).unwrap();
        assert_eq!(p.table.rows(), 1);
        assert_eq!(codec.resume_offset(&ch), 18);
        assert_eq!(codec.count_offset(), None);
    }

    #[test]
    fn char_tokens() {
        for b in [b'a', b' ', b'!', b'"', b'\\', 0u8, 0xffu8] {
            assert_eq!(decode_char(&encode_char(b)).unwrap(), Value::Char(b));
        }
    }
}
