//! Scalar values tagged with their primitive type.

use anyhow::{bail, Result};
use std::fmt;

use super::{f80, PrimitiveType};
use crate::error::SddsError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Char(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Held as f64; see `types::f80` for the wire form.
    Float80(f64),
    /// UTF-8 text. String bytes on the wire that are not UTF-8 fail to
    /// decode with a format error.
    String(String),
}

impl Value {
    pub fn ty(&self) -> PrimitiveType {
        match self {
            Value::Char(_) => PrimitiveType::Char,
            Value::Int16(_) => PrimitiveType::Int16,
            Value::UInt16(_) => PrimitiveType::UInt16,
            Value::Int32(_) => PrimitiveType::Int32,
            Value::UInt32(_) => PrimitiveType::UInt32,
            Value::Int64(_) => PrimitiveType::Int64,
            Value::UInt64(_) => PrimitiveType::UInt64,
            Value::Float32(_) => PrimitiveType::Float32,
            Value::Float64(_) => PrimitiveType::Float64,
            Value::Float80(_) => PrimitiveType::Float80,
            Value::String(_) => PrimitiveType::String,
        }
    }

    /// Zero / empty value of a type.
    pub fn default_of(ty: PrimitiveType) -> Value {
        match ty {
            PrimitiveType::Char => Value::Char(0),
            PrimitiveType::Int16 => Value::Int16(0),
            PrimitiveType::UInt16 => Value::UInt16(0),
            PrimitiveType::Int32 => Value::Int32(0),
            PrimitiveType::UInt32 => Value::UInt32(0),
            PrimitiveType::Int64 => Value::Int64(0),
            PrimitiveType::UInt64 => Value::UInt64(0),
            PrimitiveType::Float32 => Value::Float32(0.0),
            PrimitiveType::Float64 => Value::Float64(0.0),
            PrimitiveType::Float80 => Value::Float80(0.0),
            PrimitiveType::String => Value::String(String::new()),
        }
    }

    /// Numeric view; `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        Some(match self {
            Value::Char(v) => *v as f64,
            Value::Int16(v) => *v as f64,
            Value::UInt16(v) => *v as f64,
            Value::Int32(v) => *v as f64,
            Value::UInt32(v) => *v as f64,
            Value::Int64(v) => *v as f64,
            Value::UInt64(v) => *v as f64,
            Value::Float32(v) => *v as f64,
            Value::Float64(v) | Value::Float80(v) => *v,
            Value::String(_) => return None,
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Char(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::UInt16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::UInt32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to `ty`. Same type is a clone; numeric types convert with
    /// range checks for integers; strings only convert to strings.
    pub fn cast_to(&self, ty: PrimitiveType) -> Result<Value> {
        if self.ty() == ty {
            return Ok(self.clone());
        }
        if ty == PrimitiveType::String || self.ty() == PrimitiveType::String {
            bail!(SddsError::Usage(format!(
                "cannot convert {} value to {}",
                self.ty(),
                ty
            )));
        }
        if ty.is_float() {
            let f = self.as_f64().unwrap_or_default();
            return Ok(match ty {
                PrimitiveType::Float32 => Value::Float32(f as f32),
                PrimitiveType::Float80 => Value::Float80(f),
                _ => Value::Float64(f),
            });
        }
        let i: i128 = match self {
            Value::Float32(f) => float_to_int(*f as f64, ty)?,
            Value::Float64(f) | Value::Float80(f) => float_to_int(*f, ty)?,
            Value::UInt64(v) => *v as i128,
            other => other.as_i64().unwrap_or_default() as i128,
        };
        int_value(ty, i)
    }

    /// Same value with the bytes of its binary representation reversed.
    pub fn swap_bytes(&self) -> Value {
        match self {
            Value::Char(v) => Value::Char(*v),
            Value::Int16(v) => Value::Int16(v.swap_bytes()),
            Value::UInt16(v) => Value::UInt16(v.swap_bytes()),
            Value::Int32(v) => Value::Int32(v.swap_bytes()),
            Value::UInt32(v) => Value::UInt32(v.swap_bytes()),
            Value::Int64(v) => Value::Int64(v.swap_bytes()),
            Value::UInt64(v) => Value::UInt64(v.swap_bytes()),
            Value::Float32(v) => Value::Float32(f32::from_bits(v.to_bits().swap_bytes())),
            Value::Float64(v) => Value::Float64(f64::from_bits(v.to_bits().swap_bytes())),
            // in-memory f64 bits; the 16-byte wire form is swapped by `swap_in_place`
            Value::Float80(v) => Value::Float80(f64::from_bits(v.to_bits().swap_bytes())),
            Value::String(s) => Value::String(s.clone()),
        }
    }

    /// Append the host-order binary form of a fixed-size value.
    pub fn extend_ne_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Value::Char(v) => out.push(*v),
            Value::Int16(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Value::UInt16(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Value::Int32(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Value::UInt32(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Value::Int64(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Value::UInt64(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Value::Float32(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Value::Float64(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Value::Float80(v) => out.extend_from_slice(&f80_ne_bytes(*v)),
            Value::String(s) => out.extend_from_slice(s.as_bytes()),
        }
    }

    /// Decode a fixed-size value from host-order bytes (`b.len()` must match).
    pub fn from_ne_bytes(ty: PrimitiveType, b: &[u8]) -> Result<Value> {
        let bad_len = || {
            anyhow::Error::new(SddsError::Format(format!(
                "cannot decode {} from {} bytes",
                ty,
                b.len()
            )))
        };
        if ty.size() != Some(b.len()) {
            return Err(bad_len());
        }
        Ok(match ty {
            PrimitiveType::Char => Value::Char(b[0]),
            PrimitiveType::Int16 => Value::Int16(i16::from_ne_bytes([b[0], b[1]])),
            PrimitiveType::UInt16 => Value::UInt16(u16::from_ne_bytes([b[0], b[1]])),
            PrimitiveType::Int32 => Value::Int32(i32::from_ne_bytes(arr4(b))),
            PrimitiveType::UInt32 => Value::UInt32(u32::from_ne_bytes(arr4(b))),
            PrimitiveType::Int64 => Value::Int64(i64::from_ne_bytes(arr8(b))),
            PrimitiveType::UInt64 => Value::UInt64(u64::from_ne_bytes(arr8(b))),
            PrimitiveType::Float32 => Value::Float32(f32::from_ne_bytes(arr4(b))),
            PrimitiveType::Float64 => Value::Float64(f64::from_ne_bytes(arr8(b))),
            PrimitiveType::Float80 => Value::Float80(f80_from_ne_bytes(b)),
            PrimitiveType::String => return Err(bad_len()),
        })
    }

    /// Parse an already-unescaped text token as `ty`.
    pub fn parse(ty: PrimitiveType, token: &str) -> Result<Value> {
        let t = token.trim();
        let bad = || {
            anyhow::Error::new(SddsError::Format(format!(
                "'{}' is not a valid {} value",
                token, ty
            )))
        };
        Ok(match ty {
            PrimitiveType::Char => match token.as_bytes().first() {
                Some(b) => Value::Char(*b),
                None => return Err(bad()),
            },
            PrimitiveType::Int16 => Value::Int16(t.parse().map_err(|_| bad())?),
            PrimitiveType::UInt16 => Value::UInt16(t.parse().map_err(|_| bad())?),
            PrimitiveType::Int32 => Value::Int32(t.parse().map_err(|_| bad())?),
            PrimitiveType::UInt32 => Value::UInt32(t.parse().map_err(|_| bad())?),
            PrimitiveType::Int64 => Value::Int64(t.parse().map_err(|_| bad())?),
            PrimitiveType::UInt64 => Value::UInt64(t.parse().map_err(|_| bad())?),
            PrimitiveType::Float32 => Value::Float32(t.parse().map_err(|_| bad())?),
            PrimitiveType::Float64 => Value::Float64(t.parse().map_err(|_| bad())?),
            PrimitiveType::Float80 => Value::Float80(t.parse().map_err(|_| bad())?),
            PrimitiveType::String => Value::String(token.to_string()),
        })
    }
}

fn arr4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

fn arr8(b: &[u8]) -> [u8; 8] {
    [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

fn f80_ne_bytes(v: f64) -> [u8; f80::WIRE_SIZE] {
    let mut b = f80::to_le_bytes(v);
    if cfg!(target_endian = "big") {
        b.reverse();
    }
    b
}

fn f80_from_ne_bytes(b: &[u8]) -> f64 {
    if cfg!(target_endian = "big") {
        let mut le = [0u8; f80::WIRE_SIZE];
        le.copy_from_slice(&b[..f80::WIRE_SIZE]);
        le.reverse();
        f80::from_le_bytes(&le)
    } else {
        f80::from_le_bytes(b)
    }
}

fn float_to_int(f: f64, ty: PrimitiveType) -> Result<i128> {
    if !f.is_finite() {
        bail!(SddsError::Usage(format!("cannot convert {} to {}", f, ty)));
    }
    Ok(f.round() as i128)
}

fn int_value(ty: PrimitiveType, i: i128) -> Result<Value> {
    let out_of_range = || {
        anyhow::Error::new(SddsError::Usage(format!("{} out of range for {}", i, ty)))
    };
    Ok(match ty {
        PrimitiveType::Char => Value::Char(u8::try_from(i).map_err(|_| out_of_range())?),
        PrimitiveType::Int16 => Value::Int16(i16::try_from(i).map_err(|_| out_of_range())?),
        PrimitiveType::UInt16 => Value::UInt16(u16::try_from(i).map_err(|_| out_of_range())?),
        PrimitiveType::Int32 => Value::Int32(i32::try_from(i).map_err(|_| out_of_range())?),
        PrimitiveType::UInt32 => Value::UInt32(u32::try_from(i).map_err(|_| out_of_range())?),
        PrimitiveType::Int64 => Value::Int64(i64::try_from(i).map_err(|_| out_of_range())?),
        PrimitiveType::UInt64 => Value::UInt64(u64::try_from(i).map_err(|_| out_of_range())?),
        _ => return Err(out_of_range()),
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Char(v) => write!(f, "{}", *v as char),
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) | Value::Float80(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Char(v)
    }
}
impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}
impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt16(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Value> {
        vec![
            Value::Char(b'z'),
            Value::Int16(i16::MIN),
            Value::UInt16(u16::MAX),
            Value::Int32(-123_456),
            Value::UInt32(u32::MAX),
            Value::Int64(i64::MIN),
            Value::UInt64(u64::MAX),
            Value::Float32(-1.5e-7),
            Value::Float64(6.02214076e23),
            Value::Float80(-0.1),
        ]
    }

    #[test]
    fn swap_twice_is_identity() {
        for v in samples() {
            assert_eq!(v.swap_bytes().swap_bytes(), v);
        }
    }

    #[test]
    fn ne_bytes_round_trip() {
        for v in samples() {
            let mut b = Vec::new();
            v.extend_ne_bytes(&mut b);
            assert_eq!(Some(b.len()), v.ty().size());
            assert_eq!(Value::from_ne_bytes(v.ty(), &b).unwrap(), v);
        }
    }

    #[test]
    fn swapped_bytes_match_swap_table() {
        for v in samples().into_iter().filter(|v| v.ty() != PrimitiveType::Float80) {
            let mut a = Vec::new();
            v.extend_ne_bytes(&mut a);
            v.ty().swap_in_place(&mut a);
            let mut b = Vec::new();
            v.swap_bytes().extend_ne_bytes(&mut b);
            assert_eq!(a, b, "{:?}", v.ty());
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Value::parse(PrimitiveType::Int32, "12x").is_err());
        assert!(Value::parse(PrimitiveType::UInt16, "-1").is_err());
        assert_eq!(
            Value::parse(PrimitiveType::Float64, " 2.5e+00 ").unwrap(),
            Value::Float64(2.5)
        );
        assert!(Value::parse(PrimitiveType::Char, "").is_err());
    }

    #[test]
    fn cast_checks_range() {
        assert_eq!(
            Value::Int32(7).cast_to(PrimitiveType::Float64).unwrap(),
            Value::Float64(7.0)
        );
        assert_eq!(
            Value::Float64(2.6).cast_to(PrimitiveType::Int16).unwrap(),
            Value::Int16(3)
        );
        assert!(Value::Int32(70_000).cast_to(PrimitiveType::Int16).is_err());
        assert!(Value::from("x").cast_to(PrimitiveType::Int32).is_err());
    }
}
