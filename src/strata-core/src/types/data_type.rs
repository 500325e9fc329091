//! Logical types of record values and component parameters.

use serde::{Deserialize, Serialize};

use super::Value;

/// Type of a [`Value`] or of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Null,
    Bool,
    Int64,
    Float64,
    String,
    Array,
    Map,
    /// Any value is accepted.
    Any,
}

impl DataType {
    /// Whether a value of this type may be stored where `other` is expected.
    ///
    /// Integers widen to floats; everything fits `Any`.
    pub fn is_assignable_to(&self, other: &Self) -> bool {
        match (self, other) {
            (_, Self::Any) => true,
            (Self::Int64, Self::Float64) => true,
            (a, b) => a == b,
        }
    }

    /// JSON-Schema type keyword for this type.
    pub const fn json_schema_type(&self) -> Option<&'static str> {
        match self {
            Self::Null => Some("null"),
            Self::Bool => Some("boolean"),
            Self::Int64 => Some("integer"),
            Self::Float64 => Some("number"),
            Self::String => Some("string"),
            Self::Array => Some("array"),
            Self::Map => Some("object"),
            Self::Any => None,
        }
    }
}

impl From<&Value> for DataType {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Int64(_) => Self::Int64,
            Value::Float64(_) => Self::Float64,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Map(_) => Self::Map,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int64 => "int",
            Self::Float64 => "float",
            Self::String => "string",
            Self::Array => "array",
            Self::Map => "map",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}
