//! printf-style formatting of single values.
//!
//! Format strings declared in a layout (`format_string=%10.4f`) and the
//! per-type defaults go through here. Supported: one conversion per string,
//! flags `-+ 0#`, width, precision, length modifiers (ignored on output) and
//! conversions `d i u o x X e E f F g G c s`. Literal text around the
//! conversion is kept; `%%` is a literal percent.

use anyhow::{bail, Result};

use crate::error::SddsError;
use crate::types::{PrimitiveType, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flags {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    prefix: String,
    suffix: String,
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conv: char,
}

impl FormatSpec {
    pub fn parse(fmt: &str) -> Result<FormatSpec> {
        let bad = |why: &str| {
            anyhow::Error::new(SddsError::Schema(format!(
                "invalid format string '{}': {}",
                fmt, why
            )))
        };
        let chars: Vec<char> = fmt.chars().collect();
        let mut prefix = String::new();
        let mut i = 0;
        loop {
            if i >= chars.len() {
                return Err(bad("no conversion"));
            }
            if chars[i] == '%' {
                if chars.get(i + 1) == Some(&'%') {
                    prefix.push('%');
                    i += 2;
                    continue;
                }
                break;
            }
            prefix.push(chars[i]);
            i += 1;
        }
        i += 1; // '%'

        let mut flags = Flags::default();
        while i < chars.len() {
            match chars[i] {
                '-' => flags.left = true,
                '+' => flags.plus = true,
                ' ' => flags.space = true,
                '0' => flags.zero = true,
                '#' => flags.alt = true,
                _ => break,
            }
            i += 1;
        }
        let width = read_number(&chars, &mut i);
        let precision = if chars.get(i) == Some(&'.') {
            i += 1;
            Some(read_number(&chars, &mut i).unwrap_or(0))
        } else {
            None
        };
        while i < chars.len() && matches!(chars[i], 'h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't') {
            i += 1;
        }
        let conv = *chars.get(i).ok_or_else(|| bad("missing conversion character"))?;
        if !"diuoxXeEfFgGcs".contains(conv) {
            return Err(bad("unsupported conversion"));
        }
        i += 1;

        let mut suffix = String::new();
        while i < chars.len() {
            if chars[i] == '%' {
                if chars.get(i + 1) == Some(&'%') {
                    suffix.push('%');
                    i += 2;
                    continue;
                }
                return Err(bad("more than one conversion"));
            }
            suffix.push(chars[i]);
            i += 1;
        }

        Ok(FormatSpec {
            prefix,
            suffix,
            flags,
            width,
            precision,
            conv,
        })
    }

    /// Whether this conversion can print values of `ty`.
    pub fn accepts(&self, ty: PrimitiveType) -> bool {
        match self.conv {
            'd' | 'i' | 'u' | 'o' | 'x' | 'X' => ty.is_integer() || ty == PrimitiveType::Char,
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' => ty.is_float(),
            'c' => ty == PrimitiveType::Char,
            's' => ty == PrimitiveType::String,
            _ => false,
        }
    }

    /// Render `v`. The caller has checked `accepts(v.ty())`.
    pub fn render(&self, v: &Value) -> String {
        let (sign, body) = match self.conv {
            'd' | 'i' | 'u' => int_body(v, 10, false),
            'o' => int_body(v, 8, false),
            'x' => int_body(v, 16, false),
            'X' => int_body(v, 16, true),
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' => self.float_body(v.as_f64().unwrap_or_default()),
            'c' => (String::new(), v.to_string()),
            _ => {
                let mut s = v.to_string();
                if let Some(p) = self.precision {
                    s = s.chars().take(p).collect();
                }
                (String::new(), s)
            }
        };

        let numeric = !matches!(self.conv, 'c' | 's');
        let sign = if numeric && sign.is_empty() && is_signed_conv(self.conv) {
            if self.flags.plus {
                "+".to_string()
            } else if self.flags.space {
                " ".to_string()
            } else {
                sign
            }
        } else {
            sign
        };

        let len = sign.len() + body.len();
        let width = self.width.unwrap_or(0);
        let mut out = String::with_capacity(self.prefix.len() + width.max(len) + self.suffix.len());
        out.push_str(&self.prefix);
        if len >= width {
            out.push_str(&sign);
            out.push_str(&body);
        } else if self.flags.left {
            out.push_str(&sign);
            out.push_str(&body);
            out.extend(std::iter::repeat(' ').take(width - len));
        } else if self.flags.zero && numeric && body.starts_with(|c: char| c.is_ascii_digit()) {
            out.push_str(&sign);
            out.extend(std::iter::repeat('0').take(width - len));
            out.push_str(&body);
        } else {
            out.extend(std::iter::repeat(' ').take(width - len));
            out.push_str(&sign);
            out.push_str(&body);
        }
        out.push_str(&self.suffix);
        out
    }

    fn float_body(&self, f: f64) -> (String, String) {
        let upper = self.conv.is_ascii_uppercase();
        let sign = if f.is_sign_negative() && !f.is_nan() {
            "-".to_string()
        } else {
            String::new()
        };
        let a = f.abs();
        if !a.is_finite() {
            let s = if a.is_nan() { "nan" } else { "inf" };
            return (sign, if upper { s.to_uppercase() } else { s.to_string() });
        }
        let prec = self.precision.unwrap_or(6);
        let body = match self.conv.to_ascii_lowercase() {
            'e' => fmt_exp(a, prec, self.flags.alt),
            'f' => fmt_fixed(a, prec, self.flags.alt),
            _ => fmt_general(a, prec, self.flags.alt),
        };
        (sign, if upper { body.to_uppercase() } else { body })
    }
}

fn read_number(chars: &[char], i: &mut usize) -> Option<usize> {
    let start = *i;
    while *i < chars.len() && chars[*i].is_ascii_digit() {
        *i += 1;
    }
    if *i == start {
        return None;
    }
    chars[start..*i].iter().collect::<String>().parse().ok()
}

fn is_signed_conv(c: char) -> bool {
    matches!(c, 'd' | 'i' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G')
}

fn int_body(v: &Value, radix: u32, upper: bool) -> (String, String) {
    let n: i128 = match v {
        Value::UInt64(u) => *u as i128,
        other => other.as_i64().unwrap_or_default() as i128,
    };
    let sign = if n < 0 { "-".to_string() } else { String::new() };
    let m = n.unsigned_abs();
    let body = match radix {
        8 => format!("{:o}", m),
        16 if upper => format!("{:X}", m),
        16 => format!("{:x}", m),
        _ => m.to_string(),
    };
    (sign, body)
}

/// `%e` body for a non-negative finite value: d.ddde+XX.
fn fmt_exp(a: f64, prec: usize, alt: bool) -> String {
    let s = format!("{:.*e}", prec, a);
    let (mant, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let mut mant = mant.to_string();
    if alt && prec == 0 {
        mant.push('.');
    }
    format!(
        "{}e{}{:02}",
        mant,
        if exp < 0 { '-' } else { '+' },
        exp.unsigned_abs()
    )
}

fn fmt_fixed(a: f64, prec: usize, alt: bool) -> String {
    let mut s = format!("{:.*}", prec, a);
    if alt && prec == 0 {
        s.push('.');
    }
    s
}

fn fmt_general(a: f64, prec: usize, alt: bool) -> String {
    let p = if prec == 0 { 1 } else { prec };
    let x: i32 = if a == 0.0 {
        0
    } else {
        let probe = format!("{:.*e}", p - 1, a);
        probe
            .split_once('e')
            .and_then(|(_, e)| e.parse().ok())
            .unwrap_or(0)
    };
    let (mut body, exp_part) = if x < -4 || x >= p as i32 {
        let s = fmt_exp(a, p - 1, alt);
        match s.split_once('e') {
            Some((m, e)) => (m.to_string(), format!("e{}", e)),
            None => (s, String::new()),
        }
    } else {
        (fmt_fixed(a, (p as i32 - 1 - x).max(0) as usize, alt), String::new())
    };
    if !alt && body.contains('.') {
        while body.ends_with('0') {
            body.pop();
        }
        if body.ends_with('.') {
            body.pop();
        }
    }
    body + &exp_part
}

/// Check that `fmt` is a usable format for values of `ty`.
pub fn verify_format(fmt: &str, ty: PrimitiveType) -> Result<()> {
    let spec = FormatSpec::parse(fmt)?;
    if !spec.accepts(ty) {
        bail!(SddsError::Schema(format!(
            "format string '{}' does not fit type {}",
            fmt, ty
        )));
    }
    Ok(())
}

/// Format `v` with `fmt`, or with the type's default format when `fmt` is
/// `None` or does not fit the value's type.
pub fn format_value(v: &Value, fmt: Option<&str>) -> String {
    if let Some(f) = fmt {
        if let Ok(spec) = FormatSpec::parse(f) {
            if spec.accepts(v.ty()) {
                return spec.render(v);
            }
        }
    }
    match FormatSpec::parse(v.ty().default_format()) {
        Ok(spec) => spec.render(v),
        Err(_) => v.to_string(),
    }
}
