//! Filters: keep or drop records.

use std::cmp::Ordering;

use common_error::{type_err, StrataError, StrataResult};
use strata_core::{Record, Value};
use strata_engine::FilterFn;
use strata_logical::{Constraint, ParamSchema, ParamSpec, ParamType, Params};

use crate::common::{flag, if_missing_param, on_param, value_at};

// ============================================================================
// Value
// ============================================================================

/// Comparison applied by [`ValueFilter`], field value on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    /// The configured value is contained in the field.
    InLeft,
    /// The field is contained in the configured value.
    InRight,
    NotInLeft,
    NotInRight,
}

impl Comparator {
    pub const NAMES: [&'static str; 10] = [
        "eq", "neq", "gt", "lt", "gte", "lte", "inl", "inr", "ninl", "ninr",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::InLeft => "inl",
            Self::InRight => "inr",
            Self::NotInLeft => "ninl",
            Self::NotInRight => "ninr",
        }
    }
}

impl std::str::FromStr for Comparator {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "gt" => Ok(Self::Gt),
            "lt" => Ok(Self::Lt),
            "gte" => Ok(Self::Gte),
            "lte" => Ok(Self::Lte),
            "inl" => Ok(Self::InLeft),
            "inr" => Ok(Self::InRight),
            "ninl" => Ok(Self::NotInLeft),
            "ninr" => Ok(Self::NotInRight),
            other => Err(StrataError::value_error(format!(
                "unknown comparator '{other}'"
            ))),
        }
    }
}

/// `container` holds `item`: list membership or substring.
fn contains(container: &Value, item: &Value) -> StrataResult<bool> {
    match (container, item) {
        (Value::Array(items), item) => Ok(items
            .iter()
            .any(|v| v.compare(item) == Some(Ordering::Equal) || v == item)),
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Map(map), Value::String(key)) => Ok(map.contains_key(key)),
        (container, item) => type_err!(
            "cannot test whether {} contains {}",
            container.type_name(),
            item.type_name()
        ),
    }
}

/// Compare a field against a configured value.
#[derive(Debug, Clone)]
pub struct ValueFilter {
    on: String,
    value: Value,
    comparator: Comparator,
    if_missing: bool,
}

impl ValueFilter {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(
                ParamSpec::new("on", ParamType::String)
                    .required()
                    .constraint(Constraint::NonEmpty)
                    .describe("Field to compare"),
            )
            .param(
                ParamSpec::new("value", ParamType::Any)
                    .required()
                    .describe("Value to compare against"),
            )
            .param(
                ParamSpec::new("comparator", ParamType::String)
                    .with_default("eq")
                    .constraint(Constraint::OneOf(
                        Comparator::NAMES.iter().map(|s| (*s).to_string()).collect(),
                    ))
                    .describe("Comparison operator"),
            )
            .param(if_missing_param(true))
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self {
            on: params.str("on")?.to_string(),
            value: params
                .get("value")
                .cloned()
                .ok_or_else(|| {
                    StrataError::invalid_parameter(params.component(), "value", "missing")
                })?,
            comparator: params.str("comparator")?.parse()?,
            if_missing: params.bool("if_missing")?,
        })
    }

    fn ordering(&self, got: &Value) -> StrataResult<Ordering> {
        match got.compare(&self.value) {
            Some(ordering) => Ok(ordering),
            None => type_err!(
                "cannot order {} against {} in field '{}'",
                got.type_name(),
                self.value.type_name(),
                self.on
            ),
        }
    }
}

impl FilterFn for ValueFilter {
    fn keep(&self, record: &Record) -> StrataResult<bool> {
        let Some(got) = value_at(record, &self.on) else {
            return Ok(self.if_missing);
        };
        let equal = || got.compare(&self.value) == Some(Ordering::Equal) || *got == self.value;
        Ok(match self.comparator {
            Comparator::Eq => equal(),
            Comparator::Neq => !equal(),
            Comparator::Gt => self.ordering(got)? == Ordering::Greater,
            Comparator::Lt => self.ordering(got)? == Ordering::Less,
            Comparator::Gte => self.ordering(got)? != Ordering::Less,
            Comparator::Lte => self.ordering(got)? != Ordering::Greater,
            Comparator::InLeft => contains(got, &self.value)?,
            Comparator::InRight => contains(&self.value, got)?,
            Comparator::NotInLeft => !contains(got, &self.value)?,
            Comparator::NotInRight => !contains(&self.value, got)?,
        })
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }
}

// ============================================================================
// Exists
// ============================================================================

/// Keep records where a field is present and not null.
#[derive(Debug, Clone)]
pub struct ExistsFilter {
    on: String,
}

impl ExistsFilter {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new().param(
            ParamSpec::new("on", ParamType::String)
                .required()
                .constraint(Constraint::NonEmpty)
                .describe("Field that must be present"),
        )
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self {
            on: params.str("on")?.to_string(),
        })
    }
}

impl FilterFn for ExistsFilter {
    fn keep(&self, record: &Record) -> StrataResult<bool> {
        Ok(value_at(record, &self.on).is_some())
    }

    // Absence is the condition under test, so the field is not a dependency.
    fn input_fields(&self) -> Vec<String> {
        Vec::new()
    }
}

// ============================================================================
// Language
// ============================================================================

/// Keep records whose language tag names an allowed language with enough
/// confidence.
///
/// Reads the `{names, scores}` shape written by the language tagger. Names
/// and scores may also be single values. A bare code (`"en"`) or list of
/// codes counts as a prediction with score 1.0.
#[derive(Debug, Clone)]
pub struct LanguageFilter {
    on: String,
    allowed: Vec<String>,
    min_confidence: f64,
    allow_partial_match: bool,
    if_missing: bool,
}

impl LanguageFilter {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("language"))
            .param(
                ParamSpec::new("allowed", ParamType::StringList)
                    .with_default(Value::Array(vec![Value::from("en")]))
                    .constraint(Constraint::NonEmpty)
                    .describe("Language codes to keep"),
            )
            .param(
                ParamSpec::new("min_confidence", ParamType::Float)
                    .with_default(0.5)
                    .constraint(Constraint::Ge(0.0))
                    .constraint(Constraint::Le(1.0))
                    .describe("Minimum score for a prediction to count"),
            )
            .param(flag(
                "allow_partial_match",
                true,
                "Keep when any prediction matches, instead of requiring all",
            ))
            .param(if_missing_param(false))
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        Ok(Self {
            on: params.str("on")?.to_string(),
            allowed: params.str_list("allowed")?,
            min_confidence: params.f64("min_confidence")?,
            allow_partial_match: params.bool("allow_partial_match")?,
            if_missing: params.bool("if_missing")?,
        })
    }

    fn matches(&self, name: &Value, score: &Value) -> StrataResult<bool> {
        let (Some(name), Some(score)) = (name.as_str(), score.as_float64()) else {
            return type_err!(
                "language tag in '{}' must pair string names with numeric scores",
                self.on
            );
        };
        Ok(self.allowed.iter().any(|a| a == name) && score >= self.min_confidence)
    }
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

impl FilterFn for LanguageFilter {
    fn keep(&self, record: &Record) -> StrataResult<bool> {
        let Some(tag) = value_at(record, &self.on) else {
            return Ok(self.if_missing);
        };
        static CERTAIN: Value = Value::Float64(1.0);
        let (names, scores) = match tag {
            Value::Map(tag) => (
                tag.get("names").map(as_list).unwrap_or_default(),
                tag.get("scores").map(as_list).unwrap_or_default(),
            ),
            Value::String(_) | Value::Array(_) => {
                let names = as_list(tag);
                let scores = vec![&CERTAIN; names.len()];
                (names, scores)
            }
            other => {
                return type_err!(
                    "field '{}' holds {}, expected a language tag",
                    self.on,
                    other.type_name()
                );
            }
        };
        if names.is_empty() || scores.is_empty() {
            return Ok(self.if_missing);
        }

        for (name, score) in names.iter().zip(&scores) {
            let matched = self.matches(name, score)?;
            if matched == self.allow_partial_match {
                return Ok(matched);
            }
        }
        Ok(!self.allow_partial_match)
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }
}

// ============================================================================
// Length
// ============================================================================

/// Keep records whose numeric length field lies within `[min, max]`.
#[derive(Debug, Clone)]
pub struct LengthFilter {
    on: String,
    min: f64,
    max: Option<f64>,
    if_missing: bool,
}

impl LengthFilter {
    pub fn param_schema() -> ParamSchema {
        ParamSchema::new()
            .param(on_param("metadata.length.word_count"))
            .param(
                ParamSpec::new("min", ParamType::Float)
                    .with_default(0.0)
                    .constraint(Constraint::Ge(0.0))
                    .describe("Smallest length kept"),
            )
            .param(
                ParamSpec::new("max", ParamType::Float)
                    .constraint(Constraint::Ge(0.0))
                    .describe("Largest length kept"),
            )
            .param(if_missing_param(false))
    }

    pub fn from_params(params: &Params) -> StrataResult<Self> {
        let min = params.f64("min")?;
        let max = params.opt_f64("max")?;
        if let Some(max) = max {
            if max < min {
                return Err(StrataError::invalid_parameter(
                    params.component(),
                    "max",
                    format!("must be >= min ({min})"),
                ));
            }
        }
        Ok(Self {
            on: params.str("on")?.to_string(),
            min,
            max,
            if_missing: params.bool("if_missing")?,
        })
    }
}

impl FilterFn for LengthFilter {
    fn keep(&self, record: &Record) -> StrataResult<bool> {
        let Some(value) = value_at(record, &self.on) else {
            return Ok(self.if_missing);
        };
        let length = match value {
            Value::String(text) => text.chars().count() as f64,
            other => match other.as_float64() {
                Some(n) => n,
                None => {
                    return type_err!(
                        "field '{}' holds {}, expected a number",
                        self.on,
                        other.type_name()
                    )
                }
            },
        };
        Ok(length >= self.min && self.max.map_or(true, |max| length <= max))
    }

    fn input_fields(&self) -> Vec<String> {
        vec![self.on.clone()]
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn params(component: &str, schema: ParamSchema, pairs: &[(&str, Value)]) -> Params {
        let raw = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        schema.validate(component, &raw).unwrap()
    }

    fn value_filter(comparator: &str, value: Value) -> ValueFilter {
        ValueFilter::from_params(&params(
            "filter.value",
            ValueFilter::param_schema(),
            &[
                ("on", "n".into()),
                ("value", value),
                ("comparator", comparator.into()),
                ("if_missing", false.into()),
            ],
        ))
        .unwrap()
    }

    fn language_tag(names: &[&str], scores: &[f64]) -> Record {
        let mut tag = IndexMap::new();
        tag.insert(
            "names".to_string(),
            Value::Array(names.iter().map(|n| Value::from(*n)).collect()),
        );
        tag.insert(
            "scores".to_string(),
            Value::Array(scores.iter().map(|s| Value::Float64(*s)).collect()),
        );
        Record::new().with_field("language", tag).unwrap()
    }

    #[test]
    fn test_value_comparators() {
        let record = Record::new().with_field("n", 5i64).unwrap();

        assert!(value_filter("eq", 5i64.into()).keep(&record).unwrap());
        assert!(value_filter("eq", 5.0.into()).keep(&record).unwrap());
        assert!(value_filter("neq", "five".into()).keep(&record).unwrap());
        assert!(value_filter("gt", 4i64.into()).keep(&record).unwrap());
        assert!(!value_filter("lt", 5i64.into()).keep(&record).unwrap());
        assert!(value_filter("gte", 5i64.into()).keep(&record).unwrap());
        assert!(value_filter("lte", 5.5.into()).keep(&record).unwrap());

        let list = Value::Array(vec![1i64.into(), 5i64.into()]);
        assert!(value_filter("inr", list.clone()).keep(&record).unwrap());
        assert!(!value_filter("ninr", list).keep(&record).unwrap());
    }

    #[test]
    fn test_value_contained_in_field() {
        let record = Record::with_text("n", "the quick fox");
        assert!(value_filter("inl", "quick".into()).keep(&record).unwrap());
        assert!(value_filter("ninl", "slow".into()).keep(&record).unwrap());
    }

    #[test]
    fn test_value_incomparable_is_type_error() {
        let record = Record::with_text("n", "abc");
        let err = value_filter("gt", 1i64.into()).keep(&record).unwrap_err();
        assert!(matches!(err, StrataError::TypeError(_)));
        assert!(err.is_record_level());
    }

    #[test]
    fn test_value_if_missing() {
        let filter = ValueFilter::from_params(&params(
            "filter.value",
            ValueFilter::param_schema(),
            &[("on", "n".into()), ("value", 1i64.into())],
        ))
        .unwrap();
        assert!(filter.keep(&Record::new()).unwrap());
    }

    #[test]
    fn test_unknown_comparator_rejected_by_schema() {
        let raw = [
            ("on".to_string(), Value::from("n")),
            ("value".to_string(), Value::from(1i64)),
            ("comparator".to_string(), Value::from("approx")),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            ValueFilter::param_schema().validate("filter.value", &raw),
            Err(StrataError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_exists() {
        let filter = ExistsFilter::from_params(&params(
            "filter.exists",
            ExistsFilter::param_schema(),
            &[("on", "meta.id".into())],
        ))
        .unwrap();
        assert!(filter.keep(&Record::new().with_field("meta.id", 1i64).unwrap()).unwrap());
        assert!(!filter.keep(&Record::new().with_field("meta.id", Value::Null).unwrap()).unwrap());
        assert!(!filter.keep(&Record::new()).unwrap());
    }

    #[test]
    fn test_language_filter() {
        let filter = LanguageFilter::from_params(&params(
            "filter.language",
            LanguageFilter::param_schema(),
            &[],
        ))
        .unwrap();
        assert!(filter.keep(&language_tag(&["en"], &[0.9])).unwrap());
        assert!(!filter.keep(&language_tag(&["fr"], &[0.9])).unwrap());
        assert!(!filter.keep(&language_tag(&["en"], &[0.3])).unwrap());
        assert!(filter.keep(&language_tag(&["fr", "en"], &[0.6, 0.55])).unwrap());
        assert!(!filter.keep(&Record::new()).unwrap());
    }

    #[test]
    fn test_language_filter_requires_all() {
        let filter = LanguageFilter::from_params(&params(
            "filter.language",
            LanguageFilter::param_schema(),
            &[
                ("allowed", Value::Array(vec!["en".into(), "de".into()])),
                ("allow_partial_match", false.into()),
            ],
        ))
        .unwrap();
        assert!(filter.keep(&language_tag(&["en", "de"], &[0.6, 0.7])).unwrap());
        assert!(!filter.keep(&language_tag(&["en", "fr"], &[0.6, 0.7])).unwrap());
    }

    #[test]
    fn test_language_filter_single_values() {
        let filter = LanguageFilter::from_params(&params(
            "filter.language",
            LanguageFilter::param_schema(),
            &[],
        ))
        .unwrap();
        let mut tag = IndexMap::new();
        tag.insert("names".to_string(), Value::from("en"));
        tag.insert("scores".to_string(), Value::Float64(0.8));
        let record = Record::new().with_field("language", tag).unwrap();
        assert!(filter.keep(&record).unwrap());
    }

    #[test]
    fn test_language_filter_plain_codes() {
        let filter = LanguageFilter::from_params(&params(
            "filter.language",
            LanguageFilter::param_schema(),
            &[("min_confidence", 1.0.into())],
        ))
        .unwrap();
        let tagged = |v: Value| Record::new().with_field("language", v).unwrap();

        assert!(filter.keep(&tagged("en".into())).unwrap());
        assert!(!filter.keep(&tagged("fr".into())).unwrap());
        assert!(filter.keep(&tagged(Value::from(vec!["fr", "en"]))).unwrap());
        assert!(!filter.keep(&tagged(Value::Array(Vec::new()))).unwrap());
        assert!(matches!(
            filter.keep(&tagged(Value::Int64(7))),
            Err(StrataError::TypeError(_))
        ));
    }

    #[test]
    fn test_length_filter() {
        let filter = LengthFilter::from_params(&params(
            "filter.length",
            LengthFilter::param_schema(),
            &[("on", "words".into()), ("min", 2i64.into()), ("max", 4i64.into())],
        ))
        .unwrap();
        let words = |n: i64| Record::new().with_field("words", n).unwrap();
        assert!(!filter.keep(&words(1)).unwrap());
        assert!(filter.keep(&words(2)).unwrap());
        assert!(filter.keep(&words(4)).unwrap());
        assert!(!filter.keep(&words(5)).unwrap());
        assert!(!filter.keep(&Record::new()).unwrap());
    }

    #[test]
    fn test_length_filter_bounds_checked() {
        let params = params(
            "filter.length",
            LengthFilter::param_schema(),
            &[("min", 10i64.into()), ("max", 5i64.into())],
        );
        assert!(LengthFilter::from_params(&params).is_err());
    }
}
