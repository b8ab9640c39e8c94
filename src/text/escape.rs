//! Escaping of string/character cells in text pages and header values.
//!
//! `!` -> `\!`, `\` -> `\\`, `"` -> `\"`; plain space is kept; any other
//! whitespace, control or non-ASCII byte becomes a 3-digit octal escape.
//! Values are UTF-8; escapes that decode to invalid UTF-8 are rejected by
//! `try_unescape`.

use anyhow::Result;

use crate::error::SddsError;

/// Escape a value for the text encoding (without quoting).
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for b in s.bytes() {
        match b {
            b'!' => out.push_str("\\!"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b' ' => out.push(' '),
            0x21..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}

/// Reverse of `escape`, for page values: a result that is not UTF-8 is a
/// format error.
pub fn try_unescape(s: &str) -> Result<String> {
    String::from_utf8(unescape_bytes(s)).map_err(|e| {
        anyhow::Error::new(SddsError::Format(format!(
            "escaped value '{}' is not valid UTF-8 (byte {})",
            s,
            e.utf8_error().valid_up_to()
        )))
    })
}

/// Reverse of `escape` for header tokens; invalid UTF-8 becomes U+FFFD.
pub fn unescape(s: &str) -> String {
    match String::from_utf8(unescape_bytes(s)) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Raw bytes of an escaped value. Also understands `\n`, `\t` and `\r`;
/// an unknown escape yields the escaped character itself.
fn unescape_bytes(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' || i + 1 >= bytes.len() {
            out.push(b);
            i += 1;
            continue;
        }
        let next = bytes[i + 1];
        match next {
            b'0'..=b'7' => {
                let mut v: u32 = 0;
                let mut j = i + 1;
                while j < bytes.len() && j < i + 4 && (b'0'..=b'7').contains(&bytes[j]) {
                    v = v * 8 + (bytes[j] - b'0') as u32;
                    j += 1;
                }
                out.push((v & 0xff) as u8);
                i = j;
            }
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            other => {
                out.push(other);
                i += 2;
            }
        }
    }
    out
}

/// Wrap an escaped value in quotes when it is empty or contains a space.
pub fn quote_if_needed(escaped: String) -> String {
    if escaped.is_empty() || escaped.contains(' ') {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

/// Escape and quote: the exact token written for a string cell.
pub fn encode_token(s: &str) -> String {
    quote_if_needed(escape(s))
}
