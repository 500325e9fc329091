//! Parameter and field helpers shared by the built-in components.

use common_error::{type_err, StrataResult};
use strata_core::{Record, Value};
use strata_logical::{Constraint, ParamSpec, ParamType};

/// `on`: the field a component reads.
pub(crate) fn on_param(default: &str) -> ParamSpec {
    ParamSpec::new("on", ParamType::String)
        .with_default(default)
        .constraint(Constraint::NonEmpty)
        .describe("Field path to read from")
}

/// `to`: the field a component writes.
pub(crate) fn to_param(default: &str) -> ParamSpec {
    ParamSpec::new("to", ParamType::String)
        .with_default(default)
        .constraint(Constraint::NonEmpty)
        .describe("Field path to write results to")
}

/// `if_missing`: what a filter answers when its field is absent.
pub(crate) fn if_missing_param(default: bool) -> ParamSpec {
    ParamSpec::new("if_missing", ParamType::Bool)
        .with_default(default)
        .describe("Keep records whose field is missing or null")
}

pub(crate) fn flag(name: &str, default: bool, description: &str) -> ParamSpec {
    ParamSpec::new(name, ParamType::Bool)
        .with_default(default)
        .describe(description)
}

/// Text at `path`. Missing and null fields are `None`; anything other than a
/// string is a `TypeError`.
pub(crate) fn text_at<'r>(record: &'r Record, path: &str) -> StrataResult<Option<&'r str>> {
    match record.get(path) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => type_err!("field '{path}' holds {}, expected string", other.type_name()),
    }
}

/// Present and non-null value at `path`.
pub(crate) fn value_at<'r>(record: &'r Record, path: &str) -> Option<&'r Value> {
    record.get(path).filter(|v| !v.is_null())
}
