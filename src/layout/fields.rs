//! Field-level edits of existing definitions: change-field, rename, delete.

use anyhow::{bail, Result};

use super::{check_common, check_field_length, check_fixed_value, validate_name, DefKind, Layout};
use crate::error::SddsError;
use crate::types::PrimitiveType;

/// New value for `Layout::change_field`. Typed and string-encoded input are
/// both accepted, so `Text("double")` works for the `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Type(PrimitiveType),
    /// Clear an optional field.
    Absent,
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<PrimitiveType> for FieldValue {
    fn from(t: PrimitiveType) -> Self {
        FieldValue::Type(t)
    }
}

impl FieldValue {
    fn text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(v) => Some(v.to_string()),
            FieldValue::Type(t) => Some(t.wire_name().to_string()),
            FieldValue::Absent => None,
        }
    }

    fn integer(&self, field: &str) -> Result<i64> {
        match self {
            FieldValue::Integer(v) => Ok(*v),
            FieldValue::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                anyhow::Error::new(SddsError::Schema(format!(
                    "field '{}' expects an integer, got '{}'",
                    field, s
                )))
            }),
            _ => bail!(SddsError::Schema(format!(
                "field '{}' expects an integer",
                field
            ))),
        }
    }

    fn primitive(&self) -> Result<PrimitiveType> {
        match self {
            FieldValue::Type(t) => Ok(*t),
            FieldValue::Text(s) => Ok(s.parse::<PrimitiveType>()?),
            _ => bail!(SddsError::Schema("field 'type' expects a type name".into())),
        }
    }
}

impl Layout {
    /// Change one field of an existing definition.
    ///
    /// Common fields: `name`, `symbol`, `units`, `description`,
    /// `format_string`, `type`. Parameters add `fixed_value`; columns add
    /// `field_length`; arrays add `field_length`, `group_name`, `dimensions`.
    pub fn change_field(
        &mut self,
        kind: DefKind,
        name: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<()> {
        self.ensure_open("change field")?;
        let Some(idx) = self.index_of(kind, name) else {
            bail!(SddsError::Schema(format!("{} '{}' does not exist", kind, name)));
        };

        match field {
            "name" => {
                let Some(new_name) = value.text() else {
                    bail!(SddsError::Schema("name cannot be cleared".into()));
                };
                validate_name(&new_name)?;
                if new_name != name && self.index_of(kind, &new_name).is_some() {
                    bail!(SddsError::Schema(format!(
                        "{} '{}' already exists",
                        kind, new_name
                    )));
                }
                if let Some(d) = self.definition_mut(kind, idx) {
                    d.name = new_name;
                }
                self.rebuild_index(kind);
                return Ok(());
            }
            "symbol" | "units" | "description" => {
                let v = value.text();
                if let Some(d) = self.definition_mut(kind, idx) {
                    match field {
                        "symbol" => d.symbol = v,
                        "units" => d.units = v,
                        _ => d.description = v,
                    }
                }
                return Ok(());
            }
            "format_string" => {
                let v = value.text();
                let Some(d) = self.definition(kind, idx) else {
                    return Ok(());
                };
                let mut probe = d.clone();
                probe.format_string = v;
                check_common(&probe)?;
                if let Some(d) = self.definition_mut(kind, idx) {
                    *d = probe;
                }
                return Ok(());
            }
            "type" => {
                let ty = value.primitive()?;
                let Some(d) = self.definition(kind, idx) else {
                    return Ok(());
                };
                let mut probe = d.clone();
                probe.ty = ty;
                check_common(&probe)?;
                match kind {
                    DefKind::Parameter => {
                        if let Some(fv) = &self.parameters()[idx].fixed_value {
                            check_fixed_value(&probe, fv)?;
                        }
                    }
                    DefKind::Column => check_field_length(&probe, self.columns()[idx].field_length)?,
                    DefKind::Array => check_field_length(&probe, self.arrays()[idx].field_length)?,
                }
                if let Some(d) = self.definition_mut(kind, idx) {
                    *d = probe;
                }
                return Ok(());
            }
            _ => {}
        }

        match (kind, field) {
            (DefKind::Parameter, "fixed_value") => {
                let v = value.text();
                if let Some(fv) = &v {
                    check_fixed_value(&self.parameters()[idx].def, fv)?;
                }
                self.parameters_mut()[idx].fixed_value = v;
            }
            (DefKind::Column, "field_length") => {
                let n = to_i32(value.integer(field)?, field)?;
                check_field_length(&self.columns()[idx].def, n)?;
                self.columns_mut()[idx].field_length = n;
            }
            (DefKind::Array, "field_length") => {
                let n = to_i32(value.integer(field)?, field)?;
                check_field_length(&self.arrays()[idx].def, n)?;
                self.arrays_mut()[idx].field_length = n;
            }
            (DefKind::Array, "group_name") => {
                let mut probe = self.arrays()[idx].clone();
                probe.group_name = value.text();
                self.check_group(&probe, Some(idx))?;
                self.arrays_mut()[idx] = probe;
            }
            (DefKind::Array, "dimensions") => {
                let n = value.integer(field)?;
                if n < 1 {
                    bail!(SddsError::Schema(format!(
                        "array '{}' needs at least one dimension",
                        name
                    )));
                }
                let mut probe = self.arrays()[idx].clone();
                probe.dimensions = n as usize;
                self.check_group(&probe, Some(idx))?;
                self.arrays_mut()[idx] = probe;
            }
            _ => bail!(SddsError::Schema(format!(
                "unknown {} field '{}'",
                kind, field
            ))),
        }
        Ok(())
    }

    /// Remove a definition by name; later definitions shift down by one.
    pub fn delete(&mut self, kind: DefKind, name: &str) -> Result<()> {
        self.ensure_open("delete definition")?;
        let Some(idx) = self.index_of(kind, name) else {
            bail!(SddsError::Schema(format!("{} '{}' does not exist", kind, name)));
        };
        match kind {
            DefKind::Parameter => {
                self.parameters_mut().remove(idx);
            }
            DefKind::Column => {
                self.columns_mut().remove(idx);
            }
            DefKind::Array => {
                self.arrays_mut().remove(idx);
            }
        }
        self.rebuild_index(kind);
        Ok(())
    }
}

fn to_i32(v: i64, field: &str) -> Result<i32> {
    i32::try_from(v).map_err(|_| {
        anyhow::Error::new(SddsError::Schema(format!(
            "field '{}' out of range: {}",
            field, v
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use crate::layout::{ArrayDefinition, ColumnDefinition, DataMode, Encoding, ParameterDefinition};

    fn layout() -> Layout {
        let mut l = Layout::new(DataMode::new(Encoding::Ascii));
        l.define_parameter(ParameterDefinition::new("step", PrimitiveType::Int32)).unwrap();
        l.define_column(ColumnDefinition::new("a", PrimitiveType::Int32)).unwrap();
        l.define_column(ColumnDefinition::new("b", PrimitiveType::Float32)).unwrap();
        l.define_column(ColumnDefinition::new("c", PrimitiveType::String)).unwrap();
        l.define_array(ArrayDefinition::new("m", PrimitiveType::Float64, 2)).unwrap();
        l
    }

    #[test]
    fn type_from_string_name() {
        let mut l = layout();
        l.change_field(DefKind::Column, "b", "type", "double".into()).unwrap();
        assert_eq!(l.column("b").unwrap().ty(), PrimitiveType::Float64);
        let e = l
            .change_field(DefKind::Column, "b", "type", "quad".into())
            .unwrap_err();
        assert_eq!(error_kind(&e), ErrorKind::Schema);
    }

    #[test]
    fn rename_updates_index() {
        let mut l = layout();
        l.change_field(DefKind::Column, "a", "name", "alpha".into()).unwrap();
        assert!(l.column("a").is_none());
        assert_eq!(l.column_index("alpha"), Some(0));
        assert!(l
            .change_field(DefKind::Column, "alpha", "name", "b".into())
            .is_err());
    }

    #[test]
    fn unknown_field_and_bad_width() {
        let mut l = layout();
        let e = l
            .change_field(DefKind::Column, "a", "colour", "red".into())
            .unwrap_err();
        assert_eq!(error_kind(&e), ErrorKind::Schema);
        assert!(l
            .change_field(DefKind::Column, "a", "field_length", FieldValue::Integer(-3))
            .is_err());
        l.change_field(DefKind::Column, "c", "field_length", "-8".into()).unwrap();
        assert_eq!(l.column("c").unwrap().field_length, -8);
        assert!(l
            .change_field(DefKind::Parameter, "step", "field_length", FieldValue::Integer(3))
            .is_err());
    }

    #[test]
    fn clear_and_set_optional_fields() {
        let mut l = layout();
        l.change_field(DefKind::Parameter, "step", "units", "s".into()).unwrap();
        assert_eq!(l.parameter("step").unwrap().def.units.as_deref(), Some("s"));
        l.change_field(DefKind::Parameter, "step", "units", FieldValue::Absent).unwrap();
        assert!(l.parameter("step").unwrap().def.units.is_none());
        l.change_field(DefKind::Parameter, "step", "fixed_value", FieldValue::Integer(7))
            .unwrap();
        assert_eq!(l.parameter("step").unwrap().fixed_value.as_deref(), Some("7"));
        assert!(l
            .change_field(DefKind::Parameter, "step", "fixed_value", "x".into())
            .is_err());
    }

    #[test]
    fn delete_shifts_indices() {
        let mut l = layout();
        l.delete(DefKind::Column, "a").unwrap();
        assert_eq!(l.column_index("b"), Some(0));
        assert_eq!(l.column_index("c"), Some(1));
        assert!(l.delete(DefKind::Column, "a").is_err());
        l.delete(DefKind::Array, "m").unwrap();
        assert_eq!(l.arrays().len(), 0);
    }

    #[test]
    fn array_dimensions_change() {
        let mut l = layout();
        l.change_field(DefKind::Array, "m", "dimensions", FieldValue::Integer(3)).unwrap();
        assert_eq!(l.array("m").unwrap().dimensions, 3);
        assert!(l
            .change_field(DefKind::Array, "m", "dimensions", FieldValue::Integer(0))
            .is_err());
    }
}
