//! dataset/units — rescale a numeric definition and rename its units.

use anyhow::{bail, Result};
use log::debug;

use super::core::Dataset;
use crate::error::SddsError;
use crate::layout::DefKind;
use crate::page::{ColumnBuffer, PageData};

/// Multiply the stored values of definition `index` on `page` by `factor`.
fn scale_on_page(page: &mut PageData, kind: DefKind, index: usize, factor: f64) -> Result<()> {
    match kind {
        DefKind::Parameter => {
            if let Some(Some(v)) = page.params.get(index) {
                let mut one = ColumnBuffer::new(v.ty());
                one.push(v)?;
                one.scale(factor)?;
                page.params[index] = one.get(0);
            }
        }
        DefKind::Column => {
            if let Some(c) = page.table.columns_mut().get_mut(index) {
                c.scale(factor)?;
            }
        }
        DefKind::Array => {
            if let Some(Some(a)) = page.arrays.get_mut(index) {
                a.values.scale(factor)?;
            }
        }
    }
    Ok(())
}

impl Dataset {
    /// Convert `name` to `new_units` by multiplying its values by `factor`.
    ///
    /// With a page in memory the conversion applies to that page only.
    /// Otherwise it is remembered and applied to every page read from now on;
    /// setting it again replaces the earlier factor.
    pub fn set_units_conversion(&mut self, kind: DefKind, name: &str, new_units: &str, factor: f64) -> Result<()> {
        self.track(|ds| {
            let Some(index) = ds.layout.index_of(kind, name) else {
                bail!(SddsError::Schema(format!("unknown {} '{}'", kind, name)));
            };
            let Some(def) = ds.layout.definition_mut(kind, index) else {
                bail!(SddsError::Schema(format!("unknown {} '{}'", kind, name)));
            };
            if !def.ty.is_numeric() {
                bail!(SddsError::Usage(format!(
                    "{} '{}' is {}, not numeric",
                    kind, name, def.ty
                )));
            }
            def.units = Some(new_units.to_string());

            match ds.page.as_mut() {
                Some(page) => scale_on_page(page, kind, index, factor)?,
                None => {
                    ds.deferred_units.insert((kind, name.to_string()), factor);
                }
            }
            debug!("dataset: {} '{}' -> {} (x{})", kind, name, new_units, factor);
            Ok(())
        })
    }

    /// Apply the remembered conversions to the page just read.
    pub(crate) fn apply_deferred_units(&mut self) -> Result<()> {
        let Some(page) = self.page.as_mut() else {
            return Ok(());
        };
        for ((kind, name), factor) in &self.deferred_units {
            if let Some(index) = self.layout.index_of(*kind, name) {
                scale_on_page(page, *kind, index, *factor)?;
            }
        }
        Ok(())
    }
}
