//! Sparse row selection and per-interval statistics.
//!
//! Order of application on read: the `last_rows` window first, then
//! `sparse_offset`, then `sparse_interval`. With a statistic, each kept row
//! is replaced by the statistic over the `interval` raw rows it stands for;
//! only floating-point columns are reduced, other columns keep the first row
//! of the group.

use anyhow::{bail, Result};

use crate::error::SddsError;
use crate::page::RowTable;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Average,
    Median,
    Minimum,
    Maximum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// Keep every n-th row (>= 1).
    pub sparse_interval: usize,
    /// Raw rows skipped before selection starts.
    pub sparse_offset: usize,
    /// Only consider the last n rows of the page.
    pub last_rows: Option<usize>,
    pub statistic: Option<Statistic>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            sparse_interval: 1,
            sparse_offset: 0,
            last_rows: None,
            statistic: None,
        }
    }
}

impl ReadOptions {
    pub fn sparse(interval: usize, offset: usize) -> Self {
        Self {
            sparse_interval: interval,
            sparse_offset: offset,
            ..Self::default()
        }
    }

    pub fn with_last_rows(mut self, n: usize) -> Self {
        self.last_rows = Some(n);
        self
    }

    pub fn with_statistic(mut self, s: Statistic) -> Self {
        self.statistic = Some(s);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sparse_interval == 0 {
            bail!(SddsError::Usage("sparse interval must be at least 1".into()));
        }
        Ok(())
    }

    pub fn is_plain(&self) -> bool {
        self.sparse_interval == 1 && self.sparse_offset == 0 && self.last_rows.is_none()
    }
}

/// Streaming selector: raw rows in, selected (or reduced) rows into a table.
pub(crate) struct Selector {
    interval: usize,
    offset: usize,
    statistic: Option<Statistic>,
    seen: usize,
    group: Vec<Vec<Value>>,
}

impl Selector {
    pub(crate) fn new(opts: &ReadOptions) -> Self {
        Self {
            interval: opts.sparse_interval.max(1),
            offset: opts.sparse_offset,
            statistic: opts.statistic,
            seen: 0,
            group: Vec::new(),
        }
    }

    pub(crate) fn accept(&mut self, row: Vec<Value>, table: &mut RowTable) -> Result<()> {
        let i = self.seen;
        self.seen += 1;
        if i < self.offset {
            return Ok(());
        }
        let k = (i - self.offset) % self.interval;
        match self.statistic {
            None => {
                if k == 0 {
                    table.push_row(&row)?;
                }
            }
            Some(_) => {
                self.group.push(row);
                if self.group.len() == self.interval {
                    self.emit(table)?;
                }
            }
        }
        Ok(())
    }

    /// Emit a trailing partial group.
    pub(crate) fn finish(&mut self, table: &mut RowTable) -> Result<()> {
        if !self.group.is_empty() {
            self.emit(table)?;
        }
        Ok(())
    }

    fn emit(&mut self, table: &mut RowTable) -> Result<()> {
        let Some(stat) = self.statistic else {
            return Ok(());
        };
        let group = std::mem::take(&mut self.group);
        let Some(first) = group.first() else {
            return Ok(());
        };
        let mut out = first.clone();
        for (c, slot) in out.iter_mut().enumerate() {
            if !slot.ty().is_float() {
                continue;
            }
            let vals: Vec<f64> = group.iter().filter_map(|r| r[c].as_f64()).collect();
            let reduced = reduce(&vals, stat);
            *slot = Value::Float64(reduced).cast_to(slot.ty())?;
        }
        table.push_row(&out)
    }
}

/// Statistic over `vals`; NaN entries are ignored (all-NaN yields NaN).
pub fn reduce(vals: &[f64], stat: Statistic) -> f64 {
    let mut v: Vec<f64> = vals.iter().copied().filter(|x| !x.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    match stat {
        Statistic::Average => v.iter().sum::<f64>() / v.len() as f64,
        Statistic::Minimum => v.iter().copied().fold(f64::INFINITY, f64::min),
        Statistic::Maximum => v.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Statistic::Median => {
            v.sort_by(|a, b| a.total_cmp(b));
            let n = v.len();
            if n % 2 == 1 {
                v[n / 2]
            } else {
                (v[n / 2 - 1] + v[n / 2]) / 2.0
            }
        }
    }
}
