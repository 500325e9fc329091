//! Declared parameter schemas and validated parameter maps.
//!
//! Every component publishes a [`ParamSchema`]. The compiler validates the
//! raw parameter map of a descriptor against it, producing [`Params`] with
//! defaults filled in; the component factory then reads typed values out of
//! `Params` to build its own configuration struct.

use indexmap::IndexMap;
use serde_json::json;

use common_error::{StrataError, StrataResult};
use strata_core::{DataType, Value};

// ============================================================================
// Parameter Types
// ============================================================================

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int,
    Float,
    String,
    /// A list of strings. A single string is accepted and wrapped.
    StringList,
    /// A list of numbers. A single number is accepted and wrapped.
    FloatList,
    Map,
    Any,
}

impl ParamType {
    /// Whether a raw value has this type (after list wrapping).
    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int64(_)) => true,
            (Self::Float, v) => v.is_numeric(),
            (Self::String, Value::String(_)) => true,
            (Self::StringList, Value::Array(items)) => items.iter().all(|v| v.as_str().is_some()),
            (Self::FloatList, Value::Array(items)) => items.iter().all(Value::is_numeric),
            (Self::Map, Value::Map(_)) => true,
            _ => false,
        }
    }

    /// Wrap a scalar into a list for list-typed parameters.
    fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (Self::StringList, v @ Value::String(_)) => Value::Array(vec![v]),
            (Self::FloatList, v) if v.is_numeric() => Value::Array(vec![v]),
            (_, v) => v,
        }
    }

    fn json_schema(&self) -> serde_json::Value {
        match self {
            Self::Bool => json!({"type": "boolean"}),
            Self::Int => json!({"type": "integer"}),
            Self::Float => json!({"type": "number"}),
            Self::String => json!({"type": "string"}),
            Self::StringList => json!({"type": "array", "items": {"type": "string"}}),
            Self::FloatList => json!({"type": "array", "items": {"type": "number"}}),
            Self::Map => json!({"type": "object"}),
            Self::Any => json!({}),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bool => DataType::Bool.to_string(),
            Self::Int => DataType::Int64.to_string(),
            Self::Float => DataType::Float64.to_string(),
            Self::String => DataType::String.to_string(),
            Self::StringList => "list of strings".to_string(),
            Self::FloatList => "list of numbers".to_string(),
            Self::Map => DataType::Map.to_string(),
            Self::Any => DataType::Any.to_string(),
        };
        f.write_str(&name)
    }
}

// ============================================================================
// Constraints
// ============================================================================

/// A plain predicate over a parameter value.
///
/// Numeric constraints apply to every element of a numeric list.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    /// String value (or every string in a list) must be one of these.
    OneOf(Vec<String>),
    /// Strings and lists must not be empty.
    NonEmpty,
}

impl Constraint {
    /// Check a value, returning a description of the violation.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if let Value::Array(items) = value {
            if matches!(self, Self::NonEmpty) {
                return if items.is_empty() {
                    Err("must not be empty".to_string())
                } else {
                    Ok(())
                };
            }
            return items.iter().try_for_each(|item| self.check(item));
        }

        match self {
            Self::Gt(bound) => numeric(value, |x| x > *bound, || format!("must be > {bound}")),
            Self::Ge(bound) => numeric(value, |x| x >= *bound, || format!("must be >= {bound}")),
            Self::Lt(bound) => numeric(value, |x| x < *bound, || format!("must be < {bound}")),
            Self::Le(bound) => numeric(value, |x| x <= *bound, || format!("must be <= {bound}")),
            Self::OneOf(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => Ok(()),
                Some(s) => Err(format!("'{s}' is not one of [{}]", allowed.join(", "))),
                None => Ok(()),
            },
            Self::NonEmpty => match value.as_str() {
                Some("") => Err("must not be empty".to_string()),
                _ => Ok(()),
            },
        }
    }

    fn apply_json_schema(&self, schema: &mut serde_json::Map<String, serde_json::Value>) {
        match self {
            Self::Gt(b) => schema.insert("exclusiveMinimum".into(), json!(b)),
            Self::Ge(b) => schema.insert("minimum".into(), json!(b)),
            Self::Lt(b) => schema.insert("exclusiveMaximum".into(), json!(b)),
            Self::Le(b) => schema.insert("maximum".into(), json!(b)),
            Self::OneOf(allowed) => schema.insert("enum".into(), json!(allowed)),
            Self::NonEmpty => schema.insert("minLength".into(), json!(1)),
        };
    }
}

fn numeric(
    value: &Value,
    pred: impl Fn(f64) -> bool,
    msg: impl Fn() -> String,
) -> Result<(), String> {
    match value.as_float64() {
        Some(x) if pred(x) => Ok(()),
        Some(x) => Err(format!("{} (got {x})", msg())),
        None => Ok(()),
    }
}

// ============================================================================
// Parameter Specs
// ============================================================================

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<Value>,
    pub required: bool,
    pub description: String,
    pub constraints: Vec<Constraint>,
}

impl ParamSpec {
    /// Optional parameter without a default.
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            required: false,
            description: String::new(),
            constraints: Vec::new(),
        }
    }

    /// Parameter with a default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a human-readable description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a constraint.
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// Declared parameters of a component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    params: Vec<ParamSpec>,
}

impl ParamSchema {
    /// Schema with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.retain(|p| p.name != spec.name);
        self.params.push(spec);
        self
    }

    /// Append every parameter of another schema.
    #[must_use]
    pub fn extend(mut self, other: ParamSchema) -> Self {
        for spec in other.params {
            self = self.param(spec);
        }
        self
    }

    /// Declared parameters in declaration order.
    pub fn specs(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Look up a parameter declaration.
    pub fn spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validate a raw parameter map and fill in defaults.
    ///
    /// Unknown keys, missing required parameters, type mismatches and
    /// constraint violations all fail with `InvalidParameterError`.
    pub fn validate(&self, component: &str, raw: &IndexMap<String, Value>) -> StrataResult<Params> {
        if let Some(unknown) = raw.keys().find(|k| self.spec(k).is_none()) {
            let known: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
            return Err(StrataError::invalid_parameter(
                component,
                unknown.as_str(),
                format!("unknown parameter (expected one of: {})", known.join(", ")),
            ));
        }

        let mut values = IndexMap::with_capacity(self.params.len());
        for spec in &self.params {
            let value = match raw.get(&spec.name) {
                Some(Value::Null) | None => match (&spec.default, spec.required) {
                    (_, true) => {
                        return Err(StrataError::invalid_parameter(
                            component,
                            spec.name.as_str(),
                            "required parameter is missing",
                        ))
                    }
                    (Some(default), false) => default.clone(),
                    (None, false) => continue,
                },
                Some(raw_value) => spec.ty.coerce(raw_value.clone()),
            };

            if !spec.ty.accepts(&value) {
                return Err(StrataError::invalid_parameter(
                    component,
                    spec.name.as_str(),
                    format!("expected {}, got {}", spec.ty, value.type_name()),
                ));
            }
            for constraint in &spec.constraints {
                constraint.check(&value).map_err(|msg| {
                    StrataError::invalid_parameter(component, spec.name.as_str(), msg)
                })?;
            }
            values.insert(spec.name.clone(), value);
        }

        Ok(Params {
            component: component.to_string(),
            values,
        })
    }

    /// Render as a JSON-Schema object.
    pub fn to_json_schema(&self, id: &str, title: &str, description: &str) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for spec in &self.params {
            let mut prop = match spec.ty.json_schema() {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            if !spec.description.is_empty() {
                prop.insert("description".into(), json!(spec.description));
            }
            if let Some(default) = &spec.default {
                prop.insert("default".into(), serde_json::Value::from(default));
            }
            for constraint in &spec.constraints {
                constraint.apply_json_schema(&mut prop);
            }
            if spec.required {
                required.push(spec.name.clone());
            }
            properties.insert(spec.name.clone(), serde_json::Value::Object(prop));
        }

        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": id,
            "title": title,
            "description": description,
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

// ============================================================================
// Validated Parameters
// ============================================================================

/// A validated parameter map with defaults applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    component: String,
    values: IndexMap<String, Value>,
}

impl Params {
    /// Build directly from values, bypassing a schema. Intended for tests and
    /// programmatic construction.
    pub fn from_values(component: impl Into<String>, values: IndexMap<String, Value>) -> Self {
        Self {
            component: component.into(),
            values,
        }
    }

    /// Component these parameters belong to.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// All values.
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Raw value, `None` when unset or null.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    fn invalid(&self, name: &str, msg: impl Into<String>) -> StrataError {
        StrataError::invalid_parameter(self.component.as_str(), name, msg)
    }

    fn require(&self, name: &str) -> StrataResult<&Value> {
        self.get(name)
            .ok_or_else(|| self.invalid(name, "required parameter is missing"))
    }

    /// Required string.
    pub fn str(&self, name: &str) -> StrataResult<&str> {
        let value = self.require(name)?;
        value
            .as_str()
            .ok_or_else(|| self.invalid(name, format!("expected string, got {}", value.type_name())))
    }

    /// Optional string.
    pub fn opt_str(&self, name: &str) -> StrataResult<Option<&str>> {
        self.get(name).map(|_| self.str(name)).transpose()
    }

    /// Required integer.
    pub fn i64(&self, name: &str) -> StrataResult<i64> {
        let value = self.require(name)?;
        value
            .as_int64()
            .ok_or_else(|| self.invalid(name, format!("expected int, got {}", value.type_name())))
    }

    /// Optional integer.
    pub fn opt_i64(&self, name: &str) -> StrataResult<Option<i64>> {
        self.get(name).map(|_| self.i64(name)).transpose()
    }

    /// Required non-negative integer as `usize`.
    pub fn usize(&self, name: &str) -> StrataResult<usize> {
        let value = self.i64(name)?;
        usize::try_from(value).map_err(|_| self.invalid(name, format!("must be >= 0 (got {value})")))
    }

    /// Optional non-negative integer as `usize`.
    pub fn opt_usize(&self, name: &str) -> StrataResult<Option<usize>> {
        self.get(name).map(|_| self.usize(name)).transpose()
    }

    /// Required number.
    pub fn f64(&self, name: &str) -> StrataResult<f64> {
        let value = self.require(name)?;
        value
            .as_float64()
            .ok_or_else(|| self.invalid(name, format!("expected float, got {}", value.type_name())))
    }

    /// Optional number.
    pub fn opt_f64(&self, name: &str) -> StrataResult<Option<f64>> {
        self.get(name).map(|_| self.f64(name)).transpose()
    }

    /// Required boolean.
    pub fn bool(&self, name: &str) -> StrataResult<bool> {
        let value = self.require(name)?;
        value
            .as_bool()
            .ok_or_else(|| self.invalid(name, format!("expected bool, got {}", value.type_name())))
    }

    /// Required list of strings.
    pub fn str_list(&self, name: &str) -> StrataResult<Vec<String>> {
        match self.require(name)? {
            Value::String(s) => Ok(vec![s.clone()]),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(name, "expected list of strings"))
                })
                .collect(),
            other => Err(self.invalid(
                name,
                format!("expected list of strings, got {}", other.type_name()),
            )),
        }
    }

    /// Optional list of strings.
    pub fn opt_str_list(&self, name: &str) -> StrataResult<Option<Vec<String>>> {
        self.get(name).map(|_| self.str_list(name)).transpose()
    }

    /// Required list of numbers.
    pub fn f64_list(&self, name: &str) -> StrataResult<Vec<f64>> {
        match self.require(name)? {
            v if v.is_numeric() => Ok(v.as_float64().into_iter().collect()),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_float64()
                        .ok_or_else(|| self.invalid(name, "expected list of numbers"))
                })
                .collect(),
            other => Err(self.invalid(
                name,
                format!("expected list of numbers, got {}", other.type_name()),
            )),
        }
    }

    /// Optional list of numbers.
    pub fn opt_f64_list(&self, name: &str) -> StrataResult<Option<Vec<f64>>> {
        self.get(name).map(|_| self.f64_list(name)).transpose()
    }
}
