//! Quote- and escape-aware line tokenizer.
//!
//! Tokens are separated by whitespace. A token opening with `"` runs to the
//! next unescaped `"`. An unescaped `!` outside quotes starts a comment that
//! runs to the end of the line. A backslash always protects the next byte.

use super::escape::unescape;

/// Cursor over one physical line.
#[derive(Debug, Clone)]
pub struct LineCursor<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(line: &'a str) -> Self {
        Self { line, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }

    fn skip_ws(&mut self) {
        let b = self.line.as_bytes();
        while self.pos < b.len() && b[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// True when only whitespace or a comment is left.
    pub fn at_end(&mut self) -> bool {
        self.skip_ws();
        let b = self.line.as_bytes();
        self.pos >= b.len() || b[self.pos] == b'!'
    }

    /// Next raw token, still escaped and without surrounding quotes.
    /// Returns the slice and whether it was quoted.
    pub fn next_raw(&mut self) -> Option<(&'a str, bool)> {
        if self.at_end() {
            return None;
        }
        let b = self.line.as_bytes();
        if b[self.pos] == b'"' {
            let start = self.pos + 1;
            let mut i = start;
            while i < b.len() && b[i] != b'"' {
                if b[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            let end = i.min(b.len());
            self.pos = (i + 1).min(b.len());
            return Some((&self.line[start..end], true));
        }
        let start = self.pos;
        let mut i = start;
        while i < b.len() && !b[i].is_ascii_whitespace() && b[i] != b'!' {
            if b[i] == b'\\' {
                i += 1;
            }
            i += 1;
        }
        let end = i.min(b.len());
        self.pos = end;
        Some((&self.line[start..end], false))
    }

    /// Next token, unescaped.
    pub fn next_token(&mut self) -> Option<String> {
        self.next_raw().map(|(raw, _)| unescape(raw))
    }

    /// Take exactly `width` bytes (fewer at end of line), without skipping
    /// whitespace first. Used for fixed-width text fields.
    pub fn take_fixed(&mut self, width: usize) -> &'a str {
        let mut end = (self.pos + width).min(self.line.len());
        while end < self.line.len() && !self.line.is_char_boundary(end) {
            end += 1;
        }
        let s = &self.line[self.pos..end];
        self.pos = end;
        s
    }

    /// Skip a single separating space if one is next.
    pub fn skip_separator(&mut self) {
        if self.line.as_bytes().get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }
}

/// Split a full line into unescaped tokens, dropping any comment.
pub fn split_tokens(line: &str) -> Vec<String> {
    let mut c = LineCursor::new(line);
    let mut out = Vec::new();
    while let Some(t) = c.next_token() {
        out.push(t);
    }
    out
}

/// Remove a trailing comment (first `!` outside quotes and not escaped).
pub fn strip_comment(line: &str) -> &str {
    let b = line.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'"' => in_quotes = !in_quotes,
            b'!' if !in_quotes => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// True for lines that carry no data: blank or comment-only.
pub fn is_blank_or_comment(line: &str) -> bool {
    let t = line.trim_start();
    t.is_empty() || t.starts_with('!')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_and_quoted() {
        assert_eq!(
            split_tokens(r#"  12 "a b" c\"d "" x"#),
            vec!["12", "a b", "c\"d", "", "x"]
        );
    }

    #[test]
    fn comment_ends_tokens() {
        assert_eq!(split_tokens("1 2 ! three"), vec!["1", "2"]);
        assert_eq!(split_tokens(r"1 a\!b"), vec!["1", "a!b"]);
        assert_eq!(split_tokens("1 2!x"), vec!["1", "2"]);
    }

    #[test]
    fn quoted_escape_keeps_quote() {
        assert_eq!(split_tokens(r#""say \"hi\"""#), vec!["say \"hi\""]);
    }

    #[test]
    fn strip_comment_respects_quotes() {
        assert_eq!(strip_comment(r#"a="x!y" ! c"#), r#"a="x!y" "#);
        assert_eq!(strip_comment(r"a\!b"), r"a\!b");
    }

    #[test]
    fn fixed_width_fields() {
        let mut c = LineCursor::new("ab  cd 12");
        assert_eq!(c.take_fixed(4), "ab  ");
        c.skip_separator();
        assert_eq!(c.take_fixed(2), "cd");
        assert_eq!(c.next_token().as_deref(), Some("12"));
        assert!(c.at_end());
        assert_eq!(c.take_fixed(5), "");
    }
}
