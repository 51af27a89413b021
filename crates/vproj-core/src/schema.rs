//! Logical schema types. Pure data; no Arrow dependency here.
//!
//! The `types.rs` module contains the `Scalar`/`Column`/`RowBatch` storage that
//! these schemas describe.

use serde::{Deserialize, Serialize};

use crate::id::FieldId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
}

impl DataType {
    /// Bytes per value for fixed-width types, `None` for variable-width ones.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DataType::Boolean => Some(1),
            DataType::Int32 | DataType::Float32 => Some(4),
            DataType::Int64 | DataType::Float64 => Some(8),
            DataType::Utf8 | DataType::Binary => None,
        }
    }

    pub fn is_variable_width(&self) -> bool {
        self.fixed_width().is_none()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Boolean => "Boolean",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::Utf8 => "Utf8",
            DataType::Binary => "Binary",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DataType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Boolean" | "bool" => Ok(DataType::Boolean),
            "Int32" | "i32" => Ok(DataType::Int32),
            "Int64" | "i64" => Ok(DataType::Int64),
            "Float32" | "f32" => Ok(DataType::Float32),
            "Float64" | "f64" => Ok(DataType::Float64),
            "Utf8" | "string" => Ok(DataType::Utf8),
            "Binary" | "bytes" => Ok(DataType::Binary),
            other => Err(crate::error::Error::Schema(format!(
                "unknown data type '{other}'"
            ))),
        }
    }
}

/// How the logical rows of a batch map onto its physical buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionVectorMode {
    /// Rows are laid out densely; logical row `i` is physical row `i`.
    #[default]
    None,
    /// A selection vector lists the physical rows that are logically present.
    Indirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    #[serde(default)]
    pub selection: SelectionVectorMode,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            selection: SelectionVectorMode::None,
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![])
    }

    pub fn with_selection(mut self, selection: SelectionVectorMode) -> Self {
        self.selection = selection;
        self
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn field_by_id(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id.index())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Case-insensitive lookup, the way column references are resolved.
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .and_then(FieldId::from_index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_selection_vector(&self) -> bool {
        self.selection != SelectionVectorMode::None
    }
}
