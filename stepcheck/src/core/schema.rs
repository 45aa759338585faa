//! Column schema snapshots and expected-schema definitions.

use crate::error::{Result, StepcheckError};
use arrow::datatypes::{DataType, Schema as ArrowSchema};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Comparison class of a column or literal.
///
/// Operands are only comparable within the same class. Integers and floats
/// share the numeric class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeClass {
    Numeric,
    String,
    Boolean,
    /// Dates and timestamps. Date literals compare against both.
    Temporal,
    Other,
}

impl TypeClass {
    pub fn of(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => Self::Numeric,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Self::String,
            DataType::Boolean => Self::Boolean,
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => Self::Temporal,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Temporal => "temporal",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn serialize_data_type<S: Serializer>(data_type: &DataType, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&data_type.to_string())
}

/// One column of a bound table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(serialize_with = "serialize_data_type")]
    pub data_type: DataType,
    pub nullable: bool,
}

/// The ordered column list of a table, captured once at bind time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    columns: Vec<ColumnInfo>,
}

impl SchemaSnapshot {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self { columns }
    }

    pub fn from_arrow(schema: &ArrowSchema) -> Self {
        Self::new(
            schema
                .fields()
                .iter()
                .map(|f| ColumnInfo {
                    name: f.name().clone(),
                    data_type: f.data_type().clone(),
                    nullable: f.is_nullable(),
                })
                .collect(),
        )
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a column's type, failing with `ColumnNotFound`.
    pub fn data_type(&self, name: &str) -> Result<&DataType> {
        self.column(name)
            .map(|c| &c.data_type)
            .ok_or_else(|| StepcheckError::ColumnNotFound {
                column: name.to_string(),
            })
    }
}

/// An expected table structure for `col_schema_match` steps.
///
/// Columns are matched by position. A column with no type matches any
/// type. Type names compare case-insensitively against Arrow's display
/// name for the type (`Int64`, `Utf8`, `Date32`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<(String, Option<String>)>,
}

impl Schema {
    /// Builds an expected schema from `(name, type)` pairs.
    pub fn new<N, T>(columns: impl IntoIterator<Item = (N, T)>) -> Result<Self>
    where
        N: Into<String>,
        T: Into<String>,
    {
        Self::from_parts(
            columns
                .into_iter()
                .map(|(n, t)| (n.into(), Some(t.into())))
                .collect(),
        )
    }

    /// Builds an expected schema that checks column names only.
    pub fn names<N: Into<String>>(names: impl IntoIterator<Item = N>) -> Result<Self> {
        Self::from_parts(names.into_iter().map(|n| (n.into(), None)).collect())
    }

    /// Collects the expected schema from an existing Arrow schema.
    pub fn from_table(schema: &ArrowSchema) -> Self {
        Self {
            columns: schema
                .fields()
                .iter()
                .map(|f| (f.name().clone(), Some(f.data_type().to_string())))
                .collect(),
        }
    }

    fn from_parts(columns: Vec<(String, Option<String>)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(StepcheckError::configuration(
                "An expected schema needs at least one column",
            ));
        }
        if columns.iter().any(|(n, _)| n.trim().is_empty()) {
            return Err(StepcheckError::configuration(
                "Expected schema column names cannot be empty",
            ));
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[(String, Option<String>)] {
        &self.columns
    }

    /// Returns true when `actual` has the same columns, in order, with matching types.
    pub fn matches(&self, actual: &SchemaSnapshot) -> bool {
        self.columns.len() == actual.len()
            && self
                .columns
                .iter()
                .zip(actual.columns())
                .all(|((name, ty), col)| {
                    *name == col.name
                        && ty
                            .as_ref()
                            .map_or(true, |t| t.eq_ignore_ascii_case(&col.data_type.to_string()))
                })
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|(n, t)| match t {
                Some(t) => format!("{n}: {t}"),
                None => n.clone(),
            })
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
