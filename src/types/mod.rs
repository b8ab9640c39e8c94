//! types — the primitive type table.
//!
//! Each `PrimitiveType` has:
//! - a wire name used in headers (`double`, `long`, ...),
//! - a fixed binary size (all but `String`),
//! - a default text format (printf style),
//! - a byte-swap rule used when a binary stream's order differs from the host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SddsError;

pub mod f80;
pub mod value;

pub use value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    #[serde(rename = "character")]
    Char,
    #[serde(rename = "short")]
    Int16,
    #[serde(rename = "ushort")]
    UInt16,
    #[serde(rename = "long")]
    Int32,
    #[serde(rename = "ulong")]
    UInt32,
    #[serde(rename = "long64")]
    Int64,
    #[serde(rename = "ulong64")]
    UInt64,
    #[serde(rename = "float")]
    Float32,
    #[serde(rename = "double")]
    Float64,
    #[serde(rename = "longdouble")]
    Float80,
    #[serde(rename = "string")]
    String,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 11] = [
        PrimitiveType::Char,
        PrimitiveType::Int16,
        PrimitiveType::UInt16,
        PrimitiveType::Int32,
        PrimitiveType::UInt32,
        PrimitiveType::Int64,
        PrimitiveType::UInt64,
        PrimitiveType::Float32,
        PrimitiveType::Float64,
        PrimitiveType::Float80,
        PrimitiveType::String,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            PrimitiveType::Char => "character",
            PrimitiveType::Int16 => "short",
            PrimitiveType::UInt16 => "ushort",
            PrimitiveType::Int32 => "long",
            PrimitiveType::UInt32 => "ulong",
            PrimitiveType::Int64 => "long64",
            PrimitiveType::UInt64 => "ulong64",
            PrimitiveType::Float32 => "float",
            PrimitiveType::Float64 => "double",
            PrimitiveType::Float80 => "longdouble",
            PrimitiveType::String => "string",
        }
    }

    pub fn from_wire_name(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.wire_name() == s)
    }

    /// Binary size in bytes; `None` for the variable-length string.
    pub fn size(self) -> Option<usize> {
        match self {
            PrimitiveType::Char => Some(1),
            PrimitiveType::Int16 | PrimitiveType::UInt16 => Some(2),
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float32 => Some(4),
            PrimitiveType::Int64 | PrimitiveType::UInt64 | PrimitiveType::Float64 => Some(8),
            PrimitiveType::Float80 => Some(f80::WIRE_SIZE),
            PrimitiveType::String => None,
        }
    }

    pub fn default_format(self) -> &'static str {
        match self {
            PrimitiveType::Char => "%c",
            PrimitiveType::Int16 => "%hd",
            PrimitiveType::UInt16 => "%hu",
            PrimitiveType::Int32 => "%d",
            PrimitiveType::UInt32 => "%u",
            PrimitiveType::Int64 => "%ld",
            PrimitiveType::UInt64 => "%lu",
            PrimitiveType::Float32 => "%15.8e",
            PrimitiveType::Float64 => "%22.16e",
            PrimitiveType::Float80 => "%22.16Le",
            PrimitiveType::String => "%s",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int16
                | PrimitiveType::UInt16
                | PrimitiveType::Int32
                | PrimitiveType::UInt32
                | PrimitiveType::Int64
                | PrimitiveType::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            PrimitiveType::Float32 | PrimitiveType::Float64 | PrimitiveType::Float80
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            PrimitiveType::UInt16 | PrimitiveType::UInt32 | PrimitiveType::UInt64
        )
    }

    /// Reverse the byte order of every element packed in `bytes`.
    ///
    /// Single-byte and string types are left untouched.
    pub fn swap_in_place(self, bytes: &mut [u8]) {
        match self.size() {
            Some(n) if n > 1 => {
                for chunk in bytes.chunks_exact_mut(n) {
                    chunk.reverse();
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for PrimitiveType {
    type Err = SddsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire_name(s.trim())
            .ok_or_else(|| SddsError::Schema(format!("unknown data type '{}'", s.trim())))
    }
}

/// Byte order of a binary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    #[inline]
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    #[inline]
    pub fn is_native(self) -> bool {
        self == Self::native()
    }

    pub fn name(self) -> &'static str {
        match self {
            ByteOrder::Big => "big",
            ByteOrder::Little => "little",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "big" | "big-endian" => Some(ByteOrder::Big),
            "little" | "little-endian" => Some(ByteOrder::Little),
            _ => None,
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for t in PrimitiveType::ALL {
            assert_eq!(t.wire_name().parse::<PrimitiveType>().unwrap(), t);
        }
        assert!("int".parse::<PrimitiveType>().is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(PrimitiveType::Char.size(), Some(1));
        assert_eq!(PrimitiveType::Int32.size(), Some(4));
        assert_eq!(PrimitiveType::Float80.size(), Some(16));
        assert_eq!(PrimitiveType::String.size(), None);
    }

    #[test]
    fn swap_twice_is_identity() {
        for t in PrimitiveType::ALL {
            let Some(n) = t.size() else { continue };
            let orig: Vec<u8> = (0..(n * 3) as u8).collect();
            let mut b = orig.clone();
            t.swap_in_place(&mut b);
            if n > 1 {
                assert_ne!(b, orig, "{t} must change");
            }
            t.swap_in_place(&mut b);
            assert_eq!(b, orig, "{t}");
        }
    }

    #[test]
    fn byte_order_names() {
        assert_eq!(ByteOrder::from_name("BIG"), Some(ByteOrder::Big));
        assert_eq!(ByteOrder::from_name("little-endian"), Some(ByteOrder::Little));
        assert_eq!(ByteOrder::from_name("middle"), None);
    }
}
