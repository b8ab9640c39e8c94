//! Row table: one buffer per column, a row-of-interest flag per row.

use anyhow::{bail, Result};

use super::buffer::ColumnBuffer;
use crate::error::SddsError;
use crate::layout::Layout;
use crate::types::Value;
use crate::util::try_reserve;

#[derive(Debug, Clone)]
pub struct RowTable {
    columns: Vec<ColumnBuffer>,
    flags: Vec<bool>,
    rows: usize,
    increment: usize,
}

impl RowTable {
    pub fn new(layout: &Layout, increment: usize) -> Self {
        Self {
            columns: layout
                .columns()
                .iter()
                .map(|c| ColumnBuffer::new(c.ty()))
                .collect(),
            flags: Vec::new(),
            rows: 0,
            increment: increment.max(1),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, i: usize) -> Option<&ColumnBuffer> {
        self.columns.get(i)
    }

    pub fn columns(&self) -> &[ColumnBuffer] {
        &self.columns
    }

    /// Storage slots already reserved.
    pub fn capacity(&self) -> usize {
        self.flags.capacity()
    }

    /// Reserve room for at least `n` rows, growing in whole increments.
    pub fn reserve_rows(&mut self, n: usize) -> Result<()> {
        if n <= self.flags.capacity() {
            return Ok(());
        }
        let need = n - self.rows;
        let steps = need.div_ceil(self.increment);
        let extra = steps * self.increment;
        try_reserve(&mut self.flags, extra, "row flags")?;
        for c in &mut self.columns {
            c.reserve(extra)?;
        }
        Ok(())
    }

    /// Grow (default-filled, flagged of interest) or shrink to `n` rows.
    pub fn set_rows(&mut self, n: usize) -> Result<()> {
        if n > self.rows {
            self.reserve_rows(n)?;
        }
        for c in &mut self.columns {
            c.resize(n)?;
        }
        self.flags.resize(n, true);
        self.rows = n;
        Ok(())
    }

    pub fn clear(&mut self) {
        for c in &mut self.columns {
            c.clear();
        }
        self.flags.clear();
        self.rows = 0;
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<Value> {
        if row >= self.rows {
            return None;
        }
        self.columns.get(col)?.get(row)
    }

    /// Store one cell, growing the table when `row` is past the end.
    pub fn set_cell(&mut self, row: usize, col: usize, value: &Value) -> Result<()> {
        if col >= self.columns.len() {
            bail!(SddsError::Usage(format!("column index {} out of range", col)));
        }
        if row >= self.rows {
            self.set_rows(row + 1)?;
        }
        self.columns[col].set(row, value)
    }

    /// Append a row given in column order.
    pub fn push_row(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            bail!(SddsError::Usage(format!(
                "row has {} values, table has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        let r = self.rows;
        self.set_rows(r + 1)?;
        for (c, v) in values.iter().enumerate() {
            if let Err(e) = self.columns[c].set(r, v) {
                self.set_rows(r)?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Replace a whole column. On an empty table this also fixes the row
    /// count; otherwise the length must match.
    pub fn set_column(&mut self, col: usize, data: ColumnBuffer) -> Result<()> {
        let Some(slot) = self.columns.get(col) else {
            bail!(SddsError::Usage(format!("column index {} out of range", col)));
        };
        let ty = slot.ty();
        let n = data.len();
        if self.rows != 0 && n != self.rows {
            bail!(SddsError::Usage(format!(
                "column has {} values but the page has {} rows",
                n, self.rows
            )));
        }
        let data = if data.ty() == ty {
            data
        } else {
            let mut conv = ColumnBuffer::new(ty);
            conv.resize(n)?;
            for (i, v) in data.iter_values().enumerate() {
                conv.set(i, &v)?;
            }
            conv
        };
        if self.rows == 0 {
            self.set_rows(n)?;
        }
        self.columns[col] = data;
        Ok(())
    }

    // ---------- row-of-interest flags ----------

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    pub fn set_flag(&mut self, row: usize, on: bool) -> Result<()> {
        match self.flags.get_mut(row) {
            Some(f) => {
                *f = on;
                Ok(())
            }
            None => bail!(SddsError::Usage(format!("row {} out of range ({})", row, self.rows))),
        }
    }

    pub fn set_all_flags(&mut self, on: bool) {
        for f in &mut self.flags {
            *f = on;
        }
    }

    /// Indices of rows flagged of interest, starting at `from`.
    pub fn selected_from(&self, from: usize) -> Vec<usize> {
        (from..self.rows).filter(|&r| self.flags[r]).collect()
    }

    pub fn selected_count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [ColumnBuffer] {
        &mut self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColumnDefinition, DataMode, Encoding};
    use crate::types::PrimitiveType;

    fn table() -> RowTable {
        let mut l = Layout::new(DataMode::new(Encoding::Binary));
        l.define_column(ColumnDefinition::new("n", PrimitiveType::Int32)).unwrap();
        l.define_column(ColumnDefinition::new("s", PrimitiveType::String)).unwrap();
        RowTable::new(&l, 4)
    }

    #[test]
    fn grows_in_increments() {
        let mut t = table();
        t.push_row(&[Value::Int32(1), Value::from("a")]).unwrap();
        assert!(t.capacity() >= 4);
        for i in 0..9 {
            t.push_row(&[Value::Int32(i), Value::from("x")]).unwrap();
        }
        assert_eq!(t.rows(), 10);
        assert!(t.capacity() >= 10);
        assert_eq!(t.cell(0, 1), Some(Value::from("a")));
        assert_eq!(t.cell(10, 0), None);
    }

    #[test]
    fn set_cell_extends_and_flags_default_true() {
        let mut t = table();
        t.set_cell(2, 0, &Value::Int32(7)).unwrap();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.flags(), &[true, true, true]);
        t.set_flag(1, false).unwrap();
        assert_eq!(t.selected_from(0), vec![0, 2]);
        assert!(t.set_flag(3, true).is_err());
    }

    #[test]
    fn set_column_checks_length_and_converts() {
        let mut t = table();
        t.set_column(0, ColumnBuffer::from(vec![1.0f64, 2.0, 3.0])).unwrap();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.column(0).unwrap().as_slice::<i32>(), Some(&[1, 2, 3][..]));
        assert!(t.set_column(1, ColumnBuffer::from(vec!["a"])).is_err());
        t.set_column(1, ColumnBuffer::from(vec!["a", "b", "c"])).unwrap();
        assert_eq!(t.cell(2, 1), Some(Value::from("c")));
    }

    #[test]
    fn bad_row_is_not_kept() {
        let mut t = table();
        assert!(t.push_row(&[Value::from("oops"), Value::from("a")]).is_err());
        assert_eq!(t.rows(), 0);
        assert!(t.push_row(&[Value::Int32(1)]).is_err());
    }
}
