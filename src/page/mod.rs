//! page — in-memory storage for one page.
//!
//! - buffer.rs — `ColumnBuffer`, the closed sum over typed vectors.
//! - table.rs  — `RowTable`: column buffers + row-of-interest flags.
//! - array.rs  — `ArrayData`: dimension vector + elements.
//!
//! A new page reuses the layout but gets fresh storage.

use anyhow::{bail, Result};

use crate::error::SddsError;
use crate::layout::Layout;
use crate::types::Value;

pub mod array;
pub mod buffer;
pub mod table;

pub use array::{element_count, ArrayData};
pub use buffer::{ColumnBuffer, Element};
pub use table::RowTable;

#[derive(Debug, Clone)]
pub struct PageData {
    /// One slot per parameter; fixed-value parameters are filled from the layout.
    pub params: Vec<Option<Value>>,
    pub arrays: Vec<Option<ArrayData>>,
    pub table: RowTable,
}

impl PageData {
    pub fn new(layout: &Layout, row_increment: usize) -> Result<Self> {
        let mut params = Vec::with_capacity(layout.parameters().len());
        for i in 0..layout.parameters().len() {
            params.push(layout.fixed_value(i)?);
        }
        Ok(Self {
            params,
            arrays: vec![None; layout.arrays().len()],
            table: RowTable::new(layout, row_increment),
        })
    }

    pub fn set_param(&mut self, layout: &Layout, index: usize, value: &Value) -> Result<()> {
        let Some(def) = layout.parameters().get(index) else {
            bail!(SddsError::Usage(format!("parameter index {} out of range", index)));
        };
        let v = value.cast_to(def.ty())?;
        self.params[index] = Some(v);
        Ok(())
    }

    pub fn set_array(&mut self, layout: &Layout, index: usize, data: ArrayData) -> Result<()> {
        let Some(def) = layout.arrays().get(index) else {
            bail!(SddsError::Usage(format!("array index {} out of range", index)));
        };
        if data.dims.len() != def.dimensions {
            bail!(SddsError::Usage(format!(
                "array '{}' has {} dimensions, got {}",
                def.name(),
                def.dimensions,
                data.dims.len()
            )));
        }
        let data = if data.ty() == def.ty() {
            data
        } else {
            let mut conv = ArrayData::new(def.ty(), data.dims.clone())?;
            for (i, v) in data.values.iter_values().enumerate() {
                conv.values.set(i, &v)?;
            }
            conv
        };
        self.arrays[index] = Some(data);
        Ok(())
    }
}
