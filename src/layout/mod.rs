//! layout — the schema model.
//!
//! A `Layout` holds the ordered parameter, column and array definitions, the
//! data-mode descriptor and a free-text description. Each kind keeps a sorted
//! name index next to its insertion-ordered vector; serialization follows
//! insertion order. Once the header has been written or read the layout is
//! closed and only the dataset's units conversion may still touch it.
//!
//! Submodules:
//! - defs.rs   — definition structs, `DataMode`, enums.
//! - fields.rs — change-field / delete / rename operations.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::consts::{
    NAME_EXTRA_CHARS, VERSION_COLUMN_MAJOR, VERSION_INT64_TYPES, VERSION_LONG_DOUBLE,
    VERSION_UNSIGNED_TYPES,
};
use crate::error::SddsError;
use crate::text::verify_format;
use crate::types::{PrimitiveType, Value};

pub mod defs;
pub mod fields;

pub use defs::{
    ArrayDefinition, ColumnDefinition, DataMode, DefKind, Definition, Encoding,
    ParameterDefinition, RowCountPolicy,
};
pub use fields::FieldValue;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Layout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    parameters: Vec<ParameterDefinition>,
    columns: Vec<ColumnDefinition>,
    arrays: Vec<ArrayDefinition>,
    pub data_mode: DataMode,
    #[serde(skip)]
    param_index: BTreeMap<String, usize>,
    #[serde(skip)]
    column_index: BTreeMap<String, usize>,
    #[serde(skip)]
    array_index: BTreeMap<String, usize>,
    #[serde(skip)]
    closed: bool,
    /// Version found on read, or chosen on write.
    #[serde(skip)]
    pub(crate) version: u32,
}

/// Name policy: non-empty, alphanumerics plus `@:#+%-._$&/[]`, no leading digit.
pub fn validate_name(name: &str) -> Result<()> {
    let first_ok = name
        .chars()
        .next()
        .map(|c| !c.is_ascii_digit())
        .unwrap_or(false);
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || NAME_EXTRA_CHARS.contains(c));
    if !first_ok || !chars_ok {
        bail!(SddsError::Schema(format!("invalid name '{}'", name)));
    }
    Ok(())
}

impl Layout {
    pub fn new(data_mode: DataMode) -> Self {
        Self {
            data_mode,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// Header version this layout was read with (0 before any header I/O).
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn ensure_open(&self, what: &str) -> Result<()> {
        if self.closed {
            bail!(SddsError::Usage(format!(
                "cannot {}: layout is closed (header already written or read)",
                what
            )));
        }
        Ok(())
    }

    pub fn set_description<S: Into<String>>(&mut self, text: Option<S>, contents: Option<S>) -> Result<()> {
        self.ensure_open("set description")?;
        self.description = text.map(Into::into);
        self.contents = contents.map(Into::into);
        Ok(())
    }

    // ---------- define ----------

    pub fn define_parameter(&mut self, p: ParameterDefinition) -> Result<usize> {
        self.ensure_open("define parameter")?;
        validate_name(&p.def.name)?;
        if self.param_index.contains_key(&p.def.name) {
            bail!(SddsError::Schema(format!(
                "parameter '{}' already exists",
                p.def.name
            )));
        }
        check_common(&p.def)?;
        if let Some(fv) = &p.fixed_value {
            check_fixed_value(&p.def, fv)?;
        }
        let idx = self.parameters.len();
        self.param_index.insert(p.def.name.clone(), idx);
        self.parameters.push(p);
        Ok(idx)
    }

    pub fn define_column(&mut self, c: ColumnDefinition) -> Result<usize> {
        self.ensure_open("define column")?;
        validate_name(&c.def.name)?;
        if self.column_index.contains_key(&c.def.name) {
            bail!(SddsError::Schema(format!(
                "column '{}' already exists",
                c.def.name
            )));
        }
        check_common(&c.def)?;
        check_field_length(&c.def, c.field_length)?;
        let idx = self.columns.len();
        self.column_index.insert(c.def.name.clone(), idx);
        self.columns.push(c);
        Ok(idx)
    }

    pub fn define_array(&mut self, a: ArrayDefinition) -> Result<usize> {
        self.ensure_open("define array")?;
        validate_name(&a.def.name)?;
        if self.array_index.contains_key(&a.def.name) {
            bail!(SddsError::Schema(format!(
                "array '{}' already exists",
                a.def.name
            )));
        }
        check_common(&a.def)?;
        check_field_length(&a.def, a.field_length)?;
        if a.dimensions == 0 {
            bail!(SddsError::Schema(format!(
                "array '{}' needs at least one dimension",
                a.def.name
            )));
        }
        self.check_group(&a, None)?;
        let idx = self.arrays.len();
        self.array_index.insert(a.def.name.clone(), idx);
        self.arrays.push(a);
        Ok(idx)
    }

    /// Arrays sharing a group must agree on the dimension count.
    fn check_group(&self, a: &ArrayDefinition, skip: Option<usize>) -> Result<()> {
        let Some(g) = &a.group_name else {
            return Ok(());
        };
        for (i, other) in self.arrays.iter().enumerate() {
            if Some(i) == skip {
                continue;
            }
            if other.group_name.as_deref() == Some(g.as_str()) && other.dimensions != a.dimensions {
                bail!(SddsError::Schema(format!(
                    "array '{}' has {} dimensions but group '{}' uses {}",
                    a.def.name, a.dimensions, g, other.dimensions
                )));
            }
        }
        Ok(())
    }

    // ---------- lookup ----------

    pub fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn arrays(&self) -> &[ArrayDefinition] {
        &self.arrays
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.param_index.get(name).copied()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn array_index(&self, name: &str) -> Option<usize> {
        self.array_index.get(name).copied()
    }

    pub fn index_of(&self, kind: DefKind, name: &str) -> Option<usize> {
        match kind {
            DefKind::Parameter => self.parameter_index(name),
            DefKind::Column => self.column_index(name),
            DefKind::Array => self.array_index(name),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameter_index(name).map(|i| &self.parameters[i])
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn array(&self, name: &str) -> Option<&ArrayDefinition> {
        self.array_index(name).map(|i| &self.arrays[i])
    }

    /// Shared fields of a definition by kind and index.
    pub fn definition(&self, kind: DefKind, index: usize) -> Option<&Definition> {
        match kind {
            DefKind::Parameter => self.parameters.get(index).map(|p| &p.def),
            DefKind::Column => self.columns.get(index).map(|c| &c.def),
            DefKind::Array => self.arrays.get(index).map(|a| &a.def),
        }
    }

    pub(crate) fn definition_mut(&mut self, kind: DefKind, index: usize) -> Option<&mut Definition> {
        match kind {
            DefKind::Parameter => self.parameters.get_mut(index).map(|p| &mut p.def),
            DefKind::Column => self.columns.get_mut(index).map(|c| &mut c.def),
            DefKind::Array => self.arrays.get_mut(index).map(|a| &mut a.def),
        }
    }

    pub fn count(&self, kind: DefKind) -> usize {
        match kind {
            DefKind::Parameter => self.parameters.len(),
            DefKind::Column => self.columns.len(),
            DefKind::Array => self.arrays.len(),
        }
    }

    /// Parsed fixed value of parameter `index`, if it declares one.
    pub fn fixed_value(&self, index: usize) -> Result<Option<Value>> {
        let Some(p) = self.parameters.get(index) else {
            return Ok(None);
        };
        match &p.fixed_value {
            Some(s) => Ok(Some(Value::parse(p.def.ty, s)?)),
            None => Ok(None),
        }
    }

    // ---------- whole-layout checks ----------

    /// Encoding-level rules checked before the header is written.
    pub fn validate(&self) -> Result<()> {
        let dm = &self.data_mode;
        if dm.lines_per_row == 0 {
            bail!(SddsError::Schema("lines_per_row must be at least 1".into()));
        }
        if dm.column_major && dm.encoding != Encoding::Binary {
            bail!(SddsError::Schema(
                "column-major order is only available for binary data".into()
            ));
        }
        Ok(())
    }

    /// Lowest header version that can describe this layout.
    pub fn required_version(&self) -> u32 {
        let types = self
            .parameters
            .iter()
            .map(|p| p.def.ty)
            .chain(self.columns.iter().map(|c| c.def.ty))
            .chain(self.arrays.iter().map(|a| a.def.ty));
        let mut v = 1;
        for t in types {
            let need = match t {
                PrimitiveType::Float80 => VERSION_LONG_DOUBLE,
                PrimitiveType::Int64 | PrimitiveType::UInt64 => VERSION_INT64_TYPES,
                PrimitiveType::UInt16 | PrimitiveType::UInt32 => VERSION_UNSIGNED_TYPES,
                _ => 1,
            };
            v = v.max(need);
        }
        if self.data_mode.column_major {
            v = v.max(VERSION_COLUMN_MAJOR);
        }
        v
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // ---------- index maintenance (used by fields.rs) ----------

    pub(crate) fn rebuild_index(&mut self, kind: DefKind) {
        match kind {
            DefKind::Parameter => {
                self.param_index = self
                    .parameters
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (p.def.name.clone(), i))
                    .collect();
            }
            DefKind::Column => {
                self.column_index = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.def.name.clone(), i))
                    .collect();
            }
            DefKind::Array => {
                self.array_index = self
                    .arrays
                    .iter()
                    .enumerate()
                    .map(|(i, a)| (a.def.name.clone(), i))
                    .collect();
            }
        }
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut Vec<ParameterDefinition> {
        &mut self.parameters
    }

    pub(crate) fn columns_mut(&mut self) -> &mut Vec<ColumnDefinition> {
        &mut self.columns
    }

    pub(crate) fn arrays_mut(&mut self) -> &mut Vec<ArrayDefinition> {
        &mut self.arrays
    }
}

pub(crate) fn check_common(d: &Definition) -> Result<()> {
    if let Some(f) = &d.format_string {
        verify_format(f, d.ty)?;
    }
    Ok(())
}

pub(crate) fn check_field_length(d: &Definition, field_length: i32) -> Result<()> {
    if field_length < 0 && d.ty != PrimitiveType::String {
        bail!(SddsError::Schema(format!(
            "'{}': negative field length is only valid for string data",
            d.name
        )));
    }
    Ok(())
}

pub(crate) fn check_fixed_value(d: &Definition, fv: &str) -> Result<()> {
    Value::parse(d.ty, fv).map_err(|_| {
        anyhow::Error::new(SddsError::Schema(format!(
            "fixed value '{}' of parameter '{}' is not a valid {}",
            fv, d.name, d.ty
        )))
    })?;
    Ok(())
}
