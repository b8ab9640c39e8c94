//! Typed element storage shared by columns and arrays.

use anyhow::{bail, Result};

use crate::error::SddsError;
use crate::types::{PrimitiveType, Value};
use crate::util::try_reserve;

/// One growable vector per primitive type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnBuffer {
    Char(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    /// Extended precision held as f64.
    Float80(Vec<f64>),
    String(Vec<String>),
}

// Apply `$body` to the inner vector whatever the variant.
macro_rules! each {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            ColumnBuffer::Char($v) => $body,
            ColumnBuffer::Int16($v) => $body,
            ColumnBuffer::UInt16($v) => $body,
            ColumnBuffer::Int32($v) => $body,
            ColumnBuffer::UInt32($v) => $body,
            ColumnBuffer::Int64($v) => $body,
            ColumnBuffer::UInt64($v) => $body,
            ColumnBuffer::Float32($v) => $body,
            ColumnBuffer::Float64($v) => $body,
            ColumnBuffer::Float80($v) => $body,
            ColumnBuffer::String($v) => $body,
        }
    };
}

impl ColumnBuffer {
    pub fn new(ty: PrimitiveType) -> Self {
        match ty {
            PrimitiveType::Char => ColumnBuffer::Char(Vec::new()),
            PrimitiveType::Int16 => ColumnBuffer::Int16(Vec::new()),
            PrimitiveType::UInt16 => ColumnBuffer::UInt16(Vec::new()),
            PrimitiveType::Int32 => ColumnBuffer::Int32(Vec::new()),
            PrimitiveType::UInt32 => ColumnBuffer::UInt32(Vec::new()),
            PrimitiveType::Int64 => ColumnBuffer::Int64(Vec::new()),
            PrimitiveType::UInt64 => ColumnBuffer::UInt64(Vec::new()),
            PrimitiveType::Float32 => ColumnBuffer::Float32(Vec::new()),
            PrimitiveType::Float64 => ColumnBuffer::Float64(Vec::new()),
            PrimitiveType::Float80 => ColumnBuffer::Float80(Vec::new()),
            PrimitiveType::String => ColumnBuffer::String(Vec::new()),
        }
    }

    pub fn ty(&self) -> PrimitiveType {
        match self {
            ColumnBuffer::Char(_) => PrimitiveType::Char,
            ColumnBuffer::Int16(_) => PrimitiveType::Int16,
            ColumnBuffer::UInt16(_) => PrimitiveType::UInt16,
            ColumnBuffer::Int32(_) => PrimitiveType::Int32,
            ColumnBuffer::UInt32(_) => PrimitiveType::UInt32,
            ColumnBuffer::Int64(_) => PrimitiveType::Int64,
            ColumnBuffer::UInt64(_) => PrimitiveType::UInt64,
            ColumnBuffer::Float32(_) => PrimitiveType::Float32,
            ColumnBuffer::Float64(_) => PrimitiveType::Float64,
            ColumnBuffer::Float80(_) => PrimitiveType::Float80,
            ColumnBuffer::String(_) => PrimitiveType::String,
        }
    }

    pub fn len(&self) -> usize {
        each!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        each!(self, v => v.clear())
    }

    pub fn truncate(&mut self, n: usize) {
        each!(self, v => v.truncate(n))
    }

    pub fn capacity(&self) -> usize {
        each!(self, v => v.capacity())
    }

    /// Fallible reservation; failure is an allocation error.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        each!(self, v => try_reserve(v, additional, "column buffer"))
    }

    /// Grow or shrink to `n`, filling with zero / empty values.
    pub fn resize(&mut self, n: usize) -> Result<()> {
        let len = self.len();
        if n > len {
            self.reserve(n - len)?;
        }
        match self {
            ColumnBuffer::String(v) => v.resize(n, String::new()),
            ColumnBuffer::Char(v) => v.resize(n, 0),
            ColumnBuffer::Int16(v) => v.resize(n, 0),
            ColumnBuffer::UInt16(v) => v.resize(n, 0),
            ColumnBuffer::Int32(v) => v.resize(n, 0),
            ColumnBuffer::UInt32(v) => v.resize(n, 0),
            ColumnBuffer::Int64(v) => v.resize(n, 0),
            ColumnBuffer::UInt64(v) => v.resize(n, 0),
            ColumnBuffer::Float32(v) => v.resize(n, 0.0),
            ColumnBuffer::Float64(v) | ColumnBuffer::Float80(v) => v.resize(n, 0.0),
        }
        Ok(())
    }

    pub fn get(&self, i: usize) -> Option<Value> {
        Some(match self {
            ColumnBuffer::Char(v) => Value::Char(*v.get(i)?),
            ColumnBuffer::Int16(v) => Value::Int16(*v.get(i)?),
            ColumnBuffer::UInt16(v) => Value::UInt16(*v.get(i)?),
            ColumnBuffer::Int32(v) => Value::Int32(*v.get(i)?),
            ColumnBuffer::UInt32(v) => Value::UInt32(*v.get(i)?),
            ColumnBuffer::Int64(v) => Value::Int64(*v.get(i)?),
            ColumnBuffer::UInt64(v) => Value::UInt64(*v.get(i)?),
            ColumnBuffer::Float32(v) => Value::Float32(*v.get(i)?),
            ColumnBuffer::Float64(v) => Value::Float64(*v.get(i)?),
            ColumnBuffer::Float80(v) => Value::Float80(*v.get(i)?),
            ColumnBuffer::String(v) => Value::String(v.get(i)?.clone()),
        })
    }

    /// Numeric view of element `i`; `None` for strings or out of range.
    pub fn f64_at(&self, i: usize) -> Option<f64> {
        match self {
            ColumnBuffer::Char(v) => v.get(i).map(|x| *x as f64),
            ColumnBuffer::Int16(v) => v.get(i).map(|x| *x as f64),
            ColumnBuffer::UInt16(v) => v.get(i).map(|x| *x as f64),
            ColumnBuffer::Int32(v) => v.get(i).map(|x| *x as f64),
            ColumnBuffer::UInt32(v) => v.get(i).map(|x| *x as f64),
            ColumnBuffer::Int64(v) => v.get(i).map(|x| *x as f64),
            ColumnBuffer::UInt64(v) => v.get(i).map(|x| *x as f64),
            ColumnBuffer::Float32(v) => v.get(i).map(|x| *x as f64),
            ColumnBuffer::Float64(v) | ColumnBuffer::Float80(v) => v.get(i).copied(),
            ColumnBuffer::String(_) => None,
        }
    }

    /// Store `value` at `i` (which must exist), casting numerics to the buffer type.
    pub fn set(&mut self, i: usize, value: &Value) -> Result<()> {
        let len = self.len();
        if i >= len {
            bail!(SddsError::Usage(format!("index {} out of range ({})", i, len)));
        }
        let v = value.cast_to(self.ty())?;
        match (self, v) {
            (ColumnBuffer::Char(b), Value::Char(x)) => b[i] = x,
            (ColumnBuffer::Int16(b), Value::Int16(x)) => b[i] = x,
            (ColumnBuffer::UInt16(b), Value::UInt16(x)) => b[i] = x,
            (ColumnBuffer::Int32(b), Value::Int32(x)) => b[i] = x,
            (ColumnBuffer::UInt32(b), Value::UInt32(x)) => b[i] = x,
            (ColumnBuffer::Int64(b), Value::Int64(x)) => b[i] = x,
            (ColumnBuffer::UInt64(b), Value::UInt64(x)) => b[i] = x,
            (ColumnBuffer::Float32(b), Value::Float32(x)) => b[i] = x,
            (ColumnBuffer::Float64(b), Value::Float64(x)) => b[i] = x,
            (ColumnBuffer::Float80(b), Value::Float80(x)) => b[i] = x,
            (ColumnBuffer::String(b), Value::String(x)) => b[i] = x,
            (b, v) => bail!(SddsError::Usage(format!(
                "cannot store {} in a {} buffer",
                v.ty(),
                b.ty()
            ))),
        }
        Ok(())
    }

    pub fn push(&mut self, value: &Value) -> Result<()> {
        let n = self.len();
        self.resize(n + 1)?;
        if let Err(e) = self.set(n, value) {
            self.truncate(n);
            return Err(e);
        }
        Ok(())
    }

    /// Multiply every numeric element by `factor` (integers are rounded).
    pub fn scale(&mut self, factor: f64) -> Result<()> {
        macro_rules! scale_int {
            ($v:expr, $t:ty) => {
                for x in $v.iter_mut() {
                    *x = ((*x as f64) * factor).round() as $t;
                }
            };
        }
        let ty = self.ty();
        match self {
            ColumnBuffer::Char(_) | ColumnBuffer::String(_) => {
                bail!(SddsError::Usage(format!("cannot scale {} data", ty)))
            }
            ColumnBuffer::Int16(v) => scale_int!(v, i16),
            ColumnBuffer::UInt16(v) => scale_int!(v, u16),
            ColumnBuffer::Int32(v) => scale_int!(v, i32),
            ColumnBuffer::UInt32(v) => scale_int!(v, u32),
            ColumnBuffer::Int64(v) => scale_int!(v, i64),
            ColumnBuffer::UInt64(v) => scale_int!(v, u64),
            ColumnBuffer::Float32(v) => {
                for x in v.iter_mut() {
                    *x = (*x as f64 * factor) as f32;
                }
            }
            ColumnBuffer::Float64(v) | ColumnBuffer::Float80(v) => {
                for x in v.iter_mut() {
                    *x *= factor;
                }
            }
        }
        Ok(())
    }

    /// Copy of the elements at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> ColumnBuffer {
        macro_rules! pick {
            ($v:expr, $variant:ident) => {
                ColumnBuffer::$variant(indices.iter().filter_map(|&i| $v.get(i).cloned()).collect())
            };
        }
        match self {
            ColumnBuffer::Char(v) => pick!(v, Char),
            ColumnBuffer::Int16(v) => pick!(v, Int16),
            ColumnBuffer::UInt16(v) => pick!(v, UInt16),
            ColumnBuffer::Int32(v) => pick!(v, Int32),
            ColumnBuffer::UInt32(v) => pick!(v, UInt32),
            ColumnBuffer::Int64(v) => pick!(v, Int64),
            ColumnBuffer::UInt64(v) => pick!(v, UInt64),
            ColumnBuffer::Float32(v) => pick!(v, Float32),
            ColumnBuffer::Float64(v) => pick!(v, Float64),
            ColumnBuffer::Float80(v) => pick!(v, Float80),
            ColumnBuffer::String(v) => pick!(v, String),
        }
    }

    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    pub fn iter_values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

/// Native element types with a typed view into a `ColumnBuffer`.
pub trait Element: Sized + Clone {
    const TYPE: PrimitiveType;
    fn slice(buf: &ColumnBuffer) -> Option<&[Self]>;
    fn into_buffer(v: Vec<Self>) -> ColumnBuffer;
}

macro_rules! element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const TYPE: PrimitiveType = PrimitiveType::$variant;
            fn slice(buf: &ColumnBuffer) -> Option<&[Self]> {
                match buf {
                    ColumnBuffer::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }
            fn into_buffer(v: Vec<Self>) -> ColumnBuffer {
                ColumnBuffer::$variant(v)
            }
        }

        impl From<Vec<$t>> for ColumnBuffer {
            fn from(v: Vec<$t>) -> Self {
                ColumnBuffer::$variant(v)
            }
        }
    };
}

element!(u8, Char);
element!(i16, Int16);
element!(u16, UInt16);
element!(i32, Int32);
element!(u32, UInt32);
element!(i64, Int64);
element!(u64, UInt64);
element!(f32, Float32);
element!(f64, Float64);
element!(String, String);

impl From<Vec<&str>> for ColumnBuffer {
    fn from(v: Vec<&str>) -> Self {
        ColumnBuffer::String(v.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_casts_and_rejects_strings() {
        let mut b = ColumnBuffer::new(PrimitiveType::Int32);
        b.resize(2).unwrap();
        b.set(0, &Value::Float64(3.0)).unwrap();
        b.set(1, &Value::Int16(-4)).unwrap();
        assert_eq!(b.as_slice::<i32>(), Some(&[3, -4][..]));
        assert!(b.set(1, &Value::from("x")).is_err());
        assert!(b.set(5, &Value::Int32(1)).is_err());
    }

    #[test]
    fn push_rolls_back_on_error() {
        let mut b = ColumnBuffer::from(vec!["a", "b"]);
        assert!(b.push(&Value::Int32(1)).is_err());
        assert_eq!(b.len(), 2);
        b.push(&Value::from("c")).unwrap();
        assert_eq!(b.get(2), Some(Value::from("c")));
    }

    #[test]
    fn scale_and_select() {
        let mut b = ColumnBuffer::from(vec![1.0f64, 2.0, 3.0]);
        b.scale(1000.0).unwrap();
        assert_eq!(b.select(&[2, 0]), ColumnBuffer::from(vec![3000.0f64, 1000.0]));
        let mut i = ColumnBuffer::from(vec![10i16, 15]);
        i.scale(0.5).unwrap();
        assert_eq!(i.as_slice::<i16>(), Some(&[5, 8][..]));
        assert!(ColumnBuffer::from(vec!["s"]).scale(2.0).is_err());
    }
}
