use anyhow::{bail, Result};

use super::buffer::ColumnBuffer;
use crate::consts::READ_RESERVE_ELEMENTS;
use crate::error::SddsError;
use crate::types::{PrimitiveType, Value};

/// One array's contents for the current page: dimension vector plus elements
/// in row-major order (last index varies fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    pub dims: Vec<usize>,
    pub values: ColumnBuffer,
}

/// Product of the dimensions, failing on overflow.
pub fn element_count(dims: &[usize]) -> Result<usize> {
    dims.iter().try_fold(1usize, |acc, d| {
        acc.checked_mul(*d).ok_or_else(|| {
            anyhow::Error::new(SddsError::Allocation(format!(
                "array dimensions {:?} overflow",
                dims
            )))
        })
    })
}

impl ArrayData {
    /// Zero-filled array of the given shape.
    pub fn new(ty: PrimitiveType, dims: Vec<usize>) -> Result<Self> {
        let n = element_count(&dims)?;
        let mut values = ColumnBuffer::new(ty);
        values.resize(n)?;
        Ok(Self { dims, values })
    }

    /// Empty array of the given shape for a reader to `push` into. Only a
    /// bounded prefix of the element count is reserved up front.
    pub fn for_reading(ty: PrimitiveType, dims: Vec<usize>) -> Result<(Self, usize)> {
        let n = element_count(&dims)?;
        let mut values = ColumnBuffer::new(ty);
        values.reserve(n.min(READ_RESERVE_ELEMENTS))?;
        Ok((Self { dims, values }, n))
    }

    /// Wrap existing values; their count must match the shape.
    pub fn from_values(dims: Vec<usize>, values: ColumnBuffer) -> Result<Self> {
        let n = element_count(&dims)?;
        if values.len() != n {
            bail!(SddsError::Usage(format!(
                "array shape {:?} needs {} values, got {}",
                dims,
                n,
                values.len()
            )));
        }
        Ok(Self { dims, values })
    }

    pub fn ty(&self) -> PrimitiveType {
        self.values.ty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn flat_index(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut flat = 0usize;
        for (i, d) in index.iter().zip(&self.dims) {
            if i >= d {
                return None;
            }
            flat = flat * d + i;
        }
        Some(flat)
    }

    pub fn at(&self, index: &[usize]) -> Option<Value> {
        self.values.get(self.flat_index(index)?)
    }

    pub fn set_at(&mut self, index: &[usize], value: &Value) -> Result<()> {
        let Some(i) = self.flat_index(index) else {
            bail!(SddsError::Usage(format!(
                "index {:?} outside shape {:?}",
                index, self.dims
            )));
        };
        self.values.set(i, value)
    }
}
