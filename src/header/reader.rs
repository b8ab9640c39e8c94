//! Header parsing: version line, flags, sections, include stack.

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use super::namelist::{find_section_end, parse_section, Section};
use crate::consts::{
    COMMENT_CHAR, FLAG_BIG_ENDIAN, FLAG_FIXED_ROWCOUNT, FLAG_LITTLE_ENDIAN, FLAG_PREFIX,
    MAX_VERSION, MIN_VERSION, SECTION_PREFIX, TAG_ARRAY, TAG_ASSOCIATE, TAG_COLUMN, TAG_DATA,
    TAG_DESCRIPTION, TAG_INCLUDE, TAG_PARAMETER, VERSION_PREFIX,
};
use crate::error::SddsError;
use crate::layout::{
    ArrayDefinition, ColumnDefinition, DataMode, Definition, Encoding, Layout,
    ParameterDefinition,
};
use crate::metrics::record_header_section;
use crate::stream::{open_stream, Channel, OpenMode};
use crate::text::strip_comment;
use crate::types::{ByteOrder, PrimitiveType};

/// Lines of an included header, consumed front to back.
struct IncludeFrame {
    lines: std::vec::IntoIter<String>,
    dir: PathBuf,
    path: PathBuf,
}

#[derive(Default)]
struct Flags {
    big: bool,
    little: bool,
    fixed_rowcount: bool,
}

struct HeaderReader<'a> {
    ch: &'a mut Channel,
    stack: Vec<IncludeFrame>,
    base_dir: PathBuf,
    max_depth: usize,
    flags: Flags,
}

impl<'a> HeaderReader<'a> {
    /// Next physical line: innermost include first, then the main stream.
    fn next_line(&mut self) -> Result<Option<String>> {
        while let Some(top) = self.stack.last_mut() {
            if let Some(l) = top.lines.next() {
                return Ok(Some(l));
            }
            if let Some(done) = self.stack.pop() {
                debug!("header: leaving include {}", done.path.display());
            }
        }
        let mut line = String::new();
        if self.ch.read_line(&mut line)? {
            Ok(Some(line))
        } else {
            Ok(None)
        }
    }

    fn current_dir(&self) -> &Path {
        self.stack
            .last()
            .map(|f| f.dir.as_path())
            .unwrap_or(self.base_dir.as_path())
    }

    fn absorb_flag(&mut self, rest: &str) {
        match rest.trim() {
            FLAG_BIG_ENDIAN => self.flags.big = true,
            FLAG_LITTLE_ENDIAN => self.flags.little = true,
            FLAG_FIXED_ROWCOUNT => self.flags.fixed_rowcount = true,
            other => debug!("header: ignoring flag '{}'", other),
        }
    }

    /// Gather lines from `first` until the section's `&end`.
    fn collect_section(&mut self, first: &str) -> Result<Section> {
        let mut text = strip_comment(first).to_string();
        while find_section_end(&text).is_none() {
            let Some(next) = self.next_line()? else {
                bail!(SddsError::Truncation(format!(
                    "header ended inside section {:?}",
                    text.split_whitespace().next().unwrap_or("")
                )));
            };
            text.push('\n');
            text.push_str(strip_comment(&next));
        }
        if let Some(end) = find_section_end(&text) {
            let tail = text[end..].trim();
            if !tail.is_empty() {
                bail!(SddsError::Schema(format!(
                    "unexpected text after &end: {:?}",
                    tail
                )));
            }
        }
        parse_section(&text)
    }

    fn push_include(&mut self, sec: &Section) -> Result<()> {
        let Some(name) = sec.get("filename") else {
            bail!(SddsError::Schema("&include without filename".into()));
        };
        if self.stack.len() >= self.max_depth {
            bail!(SddsError::Schema(format!(
                "include depth limit ({}) exceeded at '{}'",
                self.max_depth, name
            )));
        }
        let p = Path::new(name);
        let path = if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.current_dir().join(p)
        };
        let stream = open_stream(&path, OpenMode::Read)
            .with_context(|| format!("open include {}", path.display()))?;
        let mut ch = Channel::new(stream, Some(path.clone()))?;
        let mut lines = Vec::new();
        let mut l = String::new();
        while ch.read_line(&mut l)? {
            lines.push(std::mem::take(&mut l));
        }
        ch.finish()?;
        debug!(
            "header: including {} ({} lines, depth {})",
            path.display(),
            lines.len(),
            self.stack.len() + 1
        );
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.stack.push(IncludeFrame {
            lines: lines.into_iter(),
            dir,
            path,
        });
        Ok(())
    }
}

fn parse_version(line: &str) -> Result<u32> {
    let t = line.trim();
    let Some(num) = t.strip_prefix(VERSION_PREFIX) else {
        bail!(SddsError::Schema(format!(
            "not an SDDS stream: first line is {:?}",
            t
        )));
    };
    let v: u32 = num.trim().parse().map_err(|_| {
        anyhow::Error::new(SddsError::Schema(format!("bad version line {:?}", t)))
    })?;
    if !(MIN_VERSION..=MAX_VERSION).contains(&v) {
        bail!(SddsError::Schema(format!(
            "unsupported version {} (supported {}..={})",
            v, MIN_VERSION, MAX_VERSION
        )));
    }
    Ok(v)
}

fn parse_flag01(sec: &Section, key: &str, v: &str) -> Result<bool> {
    match v.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => bail!(SddsError::Schema(format!(
            "&{} field {} expects 0 or 1, got {:?}",
            sec.tag, key, v
        ))),
    }
}

fn parse_int<T: std::str::FromStr>(sec: &Section, key: &str, v: &str) -> Result<T> {
    v.trim().parse::<T>().map_err(|_| {
        anyhow::Error::new(SddsError::Schema(format!(
            "&{} field {} expects an integer, got {:?}",
            sec.tag, key, v
        )))
    })
}

/// Fill the shared definition fields; returns the leftover (kind-specific) fields.
fn common_fields<'s>(sec: &'s Section) -> Result<(Definition, Vec<(&'s str, &'s str)>)> {
    let mut name = None;
    let mut ty = None;
    let mut def = Definition::new("", PrimitiveType::Float64);
    let mut rest = Vec::new();
    for (k, v) in &sec.fields {
        match k.as_str() {
            "name" => name = Some(v.clone()),
            "type" => ty = Some(v.parse::<PrimitiveType>()?),
            "symbol" => def.symbol = Some(v.clone()),
            "units" => def.units = Some(v.clone()),
            "description" => def.description = Some(v.clone()),
            "format_string" => def.format_string = Some(v.clone()),
            other => rest.push((other, v.as_str())),
        }
    }
    let Some(name) = name else {
        bail!(SddsError::Schema(format!("&{} without name", sec.tag)));
    };
    let Some(ty) = ty else {
        bail!(SddsError::Schema(format!("&{} '{}' without type", sec.tag, name)));
    };
    def.name = name;
    def.ty = ty;
    Ok((def, rest))
}

fn unknown_field(sec: &Section, k: &str) -> anyhow::Error {
    anyhow::Error::new(SddsError::Schema(format!(
        "unknown field '{}' in &{}",
        k, sec.tag
    )))
}

fn apply_parameter(layout: &mut Layout, sec: &Section) -> Result<()> {
    let (def, rest) = common_fields(sec)?;
    let mut p = ParameterDefinition { def, fixed_value: None };
    for (k, v) in rest {
        match k {
            "fixed_value" => p.fixed_value = Some(v.to_string()),
            _ => return Err(unknown_field(sec, k)),
        }
    }
    layout.define_parameter(p)?;
    Ok(())
}

fn apply_column(layout: &mut Layout, sec: &Section) -> Result<()> {
    let (def, rest) = common_fields(sec)?;
    let mut c = ColumnDefinition { def, field_length: 0 };
    for (k, v) in rest {
        match k {
            "field_length" => c.field_length = parse_int(sec, k, v)?,
            _ => return Err(unknown_field(sec, k)),
        }
    }
    layout.define_column(c)?;
    Ok(())
}

fn apply_array(layout: &mut Layout, sec: &Section) -> Result<()> {
    let (def, rest) = common_fields(sec)?;
    let mut a = ArrayDefinition {
        def,
        field_length: 0,
        group_name: None,
        dimensions: 1,
    };
    for (k, v) in rest {
        match k {
            "field_length" => a.field_length = parse_int(sec, k, v)?,
            "group_name" => a.group_name = Some(v.to_string()),
            "dimensions" => a.dimensions = parse_int(sec, k, v)?,
            _ => return Err(unknown_field(sec, k)),
        }
    }
    layout.define_array(a)?;
    Ok(())
}

fn apply_description(layout: &mut Layout, sec: &Section) -> Result<()> {
    for (k, v) in &sec.fields {
        match k.as_str() {
            "text" => layout.description = Some(v.clone()),
            "contents" => layout.contents = Some(v.clone()),
            _ => return Err(unknown_field(sec, k)),
        }
    }
    Ok(())
}

fn parse_data_mode(sec: &Section) -> Result<(DataMode, Option<ByteOrder>)> {
    let mut dm = DataMode::default();
    let mut endian = None;
    for (k, v) in &sec.fields {
        match k.as_str() {
            "mode" => {
                dm.encoding = match v.trim().to_ascii_lowercase().as_str() {
                    "ascii" => Encoding::Ascii,
                    "binary" => Encoding::Binary,
                    other => bail!(SddsError::Schema(format!("unknown data mode '{}'", other))),
                }
            }
            "lines_per_row" => dm.lines_per_row = parse_int(sec, k, v)?,
            "no_row_counts" => dm.no_row_counts = parse_flag01(sec, k, v)?,
            "fixed_row_count" => dm.fixed_row_count = parse_flag01(sec, k, v)?,
            "column_major_order" => dm.column_major = parse_flag01(sec, k, v)?,
            "additional_header_lines" => dm.additional_header_lines = parse_int(sec, k, v)?,
            "endian" => {
                endian = Some(ByteOrder::from_name(v.trim()).ok_or_else(|| {
                    anyhow::Error::new(SddsError::Schema(format!("unknown endian '{}'", v)))
                })?)
            }
            _ => return Err(unknown_field(sec, k)),
        }
    }
    Ok((dm, endian))
}

/// Read a complete header from `ch`, leaving the channel at the first page.
///
/// `base_dir` anchors relative include paths.
pub fn read_header(ch: &mut Channel, base_dir: Option<&Path>, max_include_depth: usize) -> Result<Layout> {
    let mut first = String::new();
    if !ch.read_line(&mut first)? {
        bail!(SddsError::Schema("empty stream: missing version line".into()));
    }
    let version = parse_version(&first)?;

    let mut r = HeaderReader {
        ch,
        stack: Vec::new(),
        base_dir: base_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        max_depth: max_include_depth,
        flags: Flags::default(),
    };
    let mut layout = Layout::default();

    let (mut dm, endian) = loop {
        let Some(line) = r.next_line()? else {
            bail!(SddsError::Truncation("header ended before the &data section".into()));
        };
        let t = line.trim_start();
        if t.is_empty() {
            continue;
        }
        if let Some(rest) = t.strip_prefix(FLAG_PREFIX) {
            r.absorb_flag(rest);
            continue;
        }
        if t.starts_with(COMMENT_CHAR) {
            continue;
        }
        if !t.starts_with(SECTION_PREFIX) {
            bail!(SddsError::Schema(format!("unexpected header line {:?}", t)));
        }

        let sec = r.collect_section(t)?;
        record_header_section();
        debug!("header: &{} ({} fields)", sec.tag, sec.fields.len());
        match sec.tag.as_str() {
            TAG_DESCRIPTION => apply_description(&mut layout, &sec)?,
            TAG_PARAMETER => apply_parameter(&mut layout, &sec)?,
            TAG_COLUMN => apply_column(&mut layout, &sec)?,
            TAG_ARRAY => apply_array(&mut layout, &sec)?,
            TAG_ASSOCIATE => debug!("header: ignoring &associate"),
            TAG_INCLUDE => r.push_include(&sec)?,
            TAG_DATA => {
                if !r.stack.is_empty() {
                    bail!(SddsError::Schema(
                        "&data is not allowed inside an included header".into()
                    ));
                }
                break parse_data_mode(&sec)?;
            }
            other => bail!(SddsError::Schema(format!("unknown section &{}", other))),
        }
    };

    if r.flags.big && r.flags.little {
        bail!(SddsError::Schema(
            "both big-endian and little-endian flags are set".into()
        ));
    }
    let flag_order = if r.flags.big {
        Some(ByteOrder::Big)
    } else if r.flags.little {
        Some(ByteOrder::Little)
    } else {
        None
    };
    dm.byte_order = match (endian, flag_order) {
        (Some(a), Some(b)) if a != b => bail!(SddsError::Schema(format!(
            "endian={} contradicts the {} flag",
            a, b
        ))),
        (a, b) => a.or(b),
    };
    dm.fixed_row_count |= r.flags.fixed_rowcount;

    if dm.encoding == Encoding::Ascii {
        for _ in 0..dm.additional_header_lines {
            let mut skip = String::new();
            if !r.ch.read_line(&mut skip)? {
                warn!("header: stream ended inside additional header lines");
                break;
            }
        }
    }

    layout.data_mode = dm;
    layout.validate()?;
    layout.version = version;
    layout.close();
    debug!(
        "header: version {}, {} parameters, {} columns, {} arrays, mode {}",
        version,
        layout.parameters().len(),
        layout.columns().len(),
        layout.arrays().len(),
        layout.data_mode.encoding.name()
    );
    Ok(layout)
}
