//! Namelist sections: `&tag key=value, key="quoted value", &end`.
//!
//! A section may span several physical lines. Values are bare words or
//! double-quoted strings in which `\"` and `\\` stand for `"` and `\`;
//! other backslash sequences are kept verbatim.

use anyhow::{bail, Result};

use crate::consts::{SECTION_END, SECTION_PREFIX};
use crate::error::SddsError;

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub tag: String,
    pub fields: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn is_sep(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b','
}

/// Byte offset just past the first unquoted `&end` in `text`, if any.
pub fn find_section_end(text: &str) -> Option<usize> {
    let b = text.as_bytes();
    let end = SECTION_END.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'"' => in_quotes = !in_quotes,
            b'&' if !in_quotes && b[i..].starts_with(end) => {
                let before_ok = i == 0 || is_sep(b[i - 1]);
                let after = i + end.len();
                let after_ok = after == b.len() || is_sep(b[after]);
                if before_ok && after_ok {
                    return Some(after);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parse one complete section (`&tag ... &end`).
pub fn parse_section(text: &str) -> Result<Section> {
    let b = text.as_bytes();
    let mut i = 0;
    let skip = |i: &mut usize| {
        while *i < b.len() && is_sep(b[*i]) {
            *i += 1;
        }
    };

    skip(&mut i);
    if i >= b.len() || b[i] != SECTION_PREFIX as u8 {
        bail!(SddsError::Schema(format!("section must start with '&': {:?}", text)));
    }
    i += 1;
    let start = i;
    while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'_') {
        i += 1;
    }
    let tag = text[start..i].to_string();
    if tag.is_empty() {
        bail!(SddsError::Schema(format!("missing section tag: {:?}", text)));
    }

    let mut fields = Vec::new();
    loop {
        skip(&mut i);
        if i >= b.len() {
            bail!(SddsError::Schema(format!("section &{} has no &end", tag)));
        }
        if text[i..].starts_with(SECTION_END)
            && (i + SECTION_END.len() == b.len() || is_sep(b[i + SECTION_END.len()]))
        {
            break;
        }

        let kstart = i;
        while i < b.len() && b[i] != b'=' && !is_sep(b[i]) {
            i += 1;
        }
        let key = text[kstart..i].to_ascii_lowercase();
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        if key.is_empty() || i >= b.len() || b[i] != b'=' {
            bail!(SddsError::Schema(format!(
                "malformed field near {:?} in &{}",
                &text[kstart..],
                tag
            )));
        }
        i += 1;
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = if i < b.len() && b[i] == b'"' {
            i += 1;
            let mut v: Vec<u8> = Vec::new();
            let mut closed = false;
            while i < b.len() {
                match b[i] {
                    b'\\' if i + 1 < b.len() && (b[i + 1] == b'"' || b[i + 1] == b'\\') => {
                        v.push(b[i + 1]);
                        i += 2;
                    }
                    b'"' => {
                        i += 1;
                        closed = true;
                        break;
                    }
                    c => {
                        v.push(c);
                        i += 1;
                    }
                }
            }
            if !closed {
                bail!(SddsError::Schema(format!(
                    "unterminated quote in field '{}' of &{}",
                    key, tag
                )));
            }
            String::from_utf8_lossy(&v).into_owned()
        } else {
            let vstart = i;
            while i < b.len() && !is_sep(b[i]) {
                i += 1;
            }
            text[vstart..i].to_string()
        };
        fields.push((key, value));
    }

    Ok(Section { tag, fields })
}

/// Render a field value, quoting when it would not survive as a bare word.
pub fn quote_value(v: &str) -> String {
    let needs = v.is_empty()
        || v.bytes().any(|c| {
            c.is_ascii_whitespace() || matches!(c, b',' | b'"' | b'\\' | b'!' | b'&' | b'=')
        });
    if !needs {
        return v.to_string();
    }
    let mut out = String::with_capacity(v.len() + 2);
    out.push('"');
    for ch in v.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// `&tag k1=v1, k2=v2, &end`
pub fn format_section(tag: &str, fields: &[(&str, String)]) -> String {
    let mut s = format!("{}{} ", SECTION_PREFIX, tag);
    for (k, v) in fields {
        s.push_str(k);
        s.push('=');
        s.push_str(&quote_value(v));
        s.push_str(", ");
    }
    s.push_str(SECTION_END);
    s
}
