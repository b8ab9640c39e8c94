//! Header serialization.

use anyhow::Result;
use log::debug;

use super::namelist::format_section;
use crate::consts::{
    FLAG_BIG_ENDIAN, FLAG_FIXED_ROWCOUNT, FLAG_LITTLE_ENDIAN, FLAG_PREFIX, TAG_ARRAY, TAG_COLUMN,
    TAG_DATA, TAG_DESCRIPTION, TAG_PARAMETER, VERSION_DATA_FIELDS, VERSION_PREFIX,
};
use crate::layout::{Definition, Encoding, Layout};
use crate::stream::Channel;
use crate::types::ByteOrder;

fn push_common<'a>(out: &mut Vec<(&'a str, String)>, d: &Definition) {
    out.push(("name", d.name.clone()));
    if let Some(s) = &d.symbol {
        out.push(("symbol", s.clone()));
    }
    if let Some(s) = &d.units {
        out.push(("units", s.clone()));
    }
    if let Some(s) = &d.description {
        out.push(("description", s.clone()));
    }
    if let Some(s) = &d.format_string {
        out.push(("format_string", s.clone()));
    }
    out.push(("type", d.ty.wire_name().to_string()));
}

/// Render the header text for `layout` at `version`.
pub fn render_header(layout: &Layout, version: u32) -> String {
    let dm = &layout.data_mode;
    let binary = dm.encoding == Encoding::Binary;
    let mut lines: Vec<String> = vec![format!("{}{}", VERSION_PREFIX, version)];

    if version < VERSION_DATA_FIELDS {
        if binary {
            let flag = match dm.effective_byte_order() {
                ByteOrder::Big => FLAG_BIG_ENDIAN,
                ByteOrder::Little => FLAG_LITTLE_ENDIAN,
            };
            lines.push(format!("{} {}", FLAG_PREFIX, flag));
        }
        if dm.fixed_row_count {
            lines.push(format!("{} {}", FLAG_PREFIX, FLAG_FIXED_ROWCOUNT));
        }
    }

    if layout.description.is_some() || layout.contents.is_some() {
        let mut f = Vec::new();
        if let Some(t) = &layout.description {
            f.push(("text", t.clone()));
        }
        if let Some(c) = &layout.contents {
            f.push(("contents", c.clone()));
        }
        lines.push(format_section(TAG_DESCRIPTION, &f));
    }

    for p in layout.parameters() {
        let mut f = Vec::new();
        push_common(&mut f, &p.def);
        if let Some(v) = &p.fixed_value {
            f.push(("fixed_value", v.clone()));
        }
        lines.push(format_section(TAG_PARAMETER, &f));
    }
    for a in layout.arrays() {
        let mut f = Vec::new();
        push_common(&mut f, &a.def);
        if let Some(g) = &a.group_name {
            f.push(("group_name", g.clone()));
        }
        if a.field_length != 0 {
            f.push(("field_length", a.field_length.to_string()));
        }
        f.push(("dimensions", a.dimensions.to_string()));
        lines.push(format_section(TAG_ARRAY, &f));
    }
    for c in layout.columns() {
        let mut f = Vec::new();
        push_common(&mut f, &c.def);
        if c.field_length != 0 {
            f.push(("field_length", c.field_length.to_string()));
        }
        lines.push(format_section(TAG_COLUMN, &f));
    }

    let mut f = vec![("mode", dm.encoding.name().to_string())];
    if dm.lines_per_row != 1 {
        f.push(("lines_per_row", dm.lines_per_row.to_string()));
    }
    if dm.no_row_counts {
        f.push(("no_row_counts", "1".to_string()));
    }
    if version >= VERSION_DATA_FIELDS {
        if dm.fixed_row_count {
            f.push(("fixed_row_count", "1".to_string()));
        }
        if binary {
            f.push(("endian", dm.effective_byte_order().name().to_string()));
        }
    }
    if dm.column_major {
        f.push(("column_major_order", "1".to_string()));
    }
    lines.push(format_section(TAG_DATA, &f));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Write the header and close the layout. Returns the version written.
pub fn write_header(ch: &mut Channel, layout: &mut Layout) -> Result<u32> {
    layout.validate()?;
    let version = layout.required_version();
    let text = render_header(layout, version);
    ch.write_str(&text)?;
    layout.version = version;
    layout.close();
    debug!(
        "header: wrote version {} ({} bytes, mode {})",
        version,
        text.len(),
        layout.data_mode.encoding.name()
    );
    Ok(version)
}
