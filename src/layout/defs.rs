//! Parameter, column and array definitions plus the data-mode descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ByteOrder, PrimitiveType};

/// Fields shared by every definition kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub format_string: Option<String>,
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
}

impl Definition {
    pub fn new<S: Into<String>>(name: S, ty: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            symbol: None,
            units: None,
            description: None,
            format_string: None,
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    #[serde(flatten)]
    pub def: Definition,
    /// Constant carried by the header instead of being written per page.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fixed_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    #[serde(flatten)]
    pub def: Definition,
    /// Text-mode field width: 0 = token, >0 = fixed, <0 = fixed with padding stripped.
    #[serde(default)]
    pub field_length: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayDefinition {
    #[serde(flatten)]
    pub def: Definition,
    #[serde(default)]
    pub field_length: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub group_name: Option<String>,
    pub dimensions: usize,
}

// Builder-style constructors; the three kinds share the same shape.
macro_rules! common_setters {
    ($t:ty) => {
        impl $t {
            pub fn with_symbol<S: Into<String>>(mut self, s: S) -> Self {
                self.def.symbol = Some(s.into());
                self
            }
            pub fn with_units<S: Into<String>>(mut self, s: S) -> Self {
                self.def.units = Some(s.into());
                self
            }
            pub fn with_description<S: Into<String>>(mut self, s: S) -> Self {
                self.def.description = Some(s.into());
                self
            }
            pub fn with_format<S: Into<String>>(mut self, s: S) -> Self {
                self.def.format_string = Some(s.into());
                self
            }
            #[inline]
            pub fn name(&self) -> &str {
                &self.def.name
            }
            #[inline]
            pub fn ty(&self) -> PrimitiveType {
                self.def.ty
            }
        }
    };
}

common_setters!(ParameterDefinition);
common_setters!(ColumnDefinition);
common_setters!(ArrayDefinition);

impl ParameterDefinition {
    pub fn new<S: Into<String>>(name: S, ty: PrimitiveType) -> Self {
        Self {
            def: Definition::new(name, ty),
            fixed_value: None,
        }
    }

    pub fn with_fixed_value<S: Into<String>>(mut self, v: S) -> Self {
        self.fixed_value = Some(v.into());
        self
    }
}

impl ColumnDefinition {
    pub fn new<S: Into<String>>(name: S, ty: PrimitiveType) -> Self {
        Self {
            def: Definition::new(name, ty),
            field_length: 0,
        }
    }

    pub fn with_field_length(mut self, n: i32) -> Self {
        self.field_length = n;
        self
    }
}

impl ArrayDefinition {
    pub fn new<S: Into<String>>(name: S, ty: PrimitiveType, dimensions: usize) -> Self {
        Self {
            def: Definition::new(name, ty),
            field_length: 0,
            group_name: None,
            dimensions,
        }
    }

    pub fn with_group<S: Into<String>>(mut self, g: S) -> Self {
        self.group_name = Some(g.into());
        self
    }

    pub fn with_field_length(mut self, n: i32) -> Self {
        self.field_length = n;
        self
    }
}

/// Which of the definition collections an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefKind {
    Parameter,
    Column,
    Array,
}

impl fmt::Display for DefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DefKind::Parameter => "parameter",
            DefKind::Column => "column",
            DefKind::Array => "array",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Ascii,
    Binary,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Binary => "binary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCountPolicy {
    /// Exact count written with each page.
    Variable,
    /// Count rounded up to a stride so rows can be appended in place.
    FixedIncrement,
    /// No count; rows run until a blank line or end of data (text only).
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMode {
    pub encoding: Encoding,
    /// Declared byte order of binary data; `None` means host order.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub byte_order: Option<ByteOrder>,
    pub lines_per_row: u32,
    pub no_row_counts: bool,
    pub fixed_row_count: bool,
    pub column_major: bool,
    #[serde(default)]
    pub additional_header_lines: u32,
}

impl Default for DataMode {
    fn default() -> Self {
        Self {
            encoding: Encoding::Binary,
            byte_order: None,
            lines_per_row: 1,
            no_row_counts: false,
            fixed_row_count: false,
            column_major: false,
            additional_header_lines: 0,
        }
    }
}

impl DataMode {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    pub fn row_count_policy(&self) -> RowCountPolicy {
        if self.no_row_counts && self.encoding == Encoding::Ascii {
            RowCountPolicy::Suppressed
        } else if self.fixed_row_count {
            RowCountPolicy::FixedIncrement
        } else {
            RowCountPolicy::Variable
        }
    }

    /// Effective byte order of binary data.
    pub fn effective_byte_order(&self) -> ByteOrder {
        self.byte_order.unwrap_or_else(ByteOrder::native)
    }
}
