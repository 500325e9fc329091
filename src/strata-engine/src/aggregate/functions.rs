//! Built-in aggregation functions.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use common_error::{StrataError, StrataResult};
use strata_core::{Record, Value};
use strata_logical::{Constraint, ParamSchema, ParamSpec, ParamType, Params};

use super::hll::{HyperLogLog, DEFAULT_PRECISION, MAX_PRECISION, MIN_PRECISION};
use super::quantile::{QuantileSketch, DEFAULT_K, MIN_K};
use super::state::{AccumulatorState, GroupSlot, SumState, WelfordState};
use crate::stages::AggregateFn;

/// Registered aggregation types with their descriptions.
pub const AGGREGATION_TYPES: [(&str, &str); 10] = [
    ("count", "Number of records, or of non-null values with ignore_nulls"),
    ("sum", "Sum of numeric values"),
    ("mean", "Arithmetic mean of numeric values"),
    ("min", "Smallest number or string"),
    ("max", "Largest number or string"),
    ("absmax", "Signed value with the largest magnitude"),
    ("std", "Population standard deviation"),
    ("quantile", "Approximate quantiles from a mergeable sketch"),
    ("unique", "Distinct values, exact or approximate"),
    ("counter", "Occurrence counts of string keys, most common first"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueOutput {
    Count,
    Values,
}

/// What an aggregation computes.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationKind {
    Count { ignore_nulls: bool },
    Sum,
    Mean,
    Min,
    Max,
    AbsMax,
    Std,
    Quantile {
        prototype: QuantileSketch,
        quantiles: Vec<f64>,
        as_list: bool,
    },
    ExactUnique {
        max_cardinality: usize,
        output: UniqueOutput,
    },
    ApproxUnique { prototype: HyperLogLog },
    Counter { top_k: usize },
}

impl AggregationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count { .. } => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::AbsMax => "absmax",
            Self::Std => "std",
            Self::Quantile { .. } => "quantile",
            Self::ExactUnique { .. } | Self::ApproxUnique { .. } => "unique",
            Self::Counter { .. } => "counter",
        }
    }

    /// Single quantile sketch with default size.
    pub fn quantile(q: f64) -> StrataResult<Self> {
        Ok(Self::Quantile {
            prototype: QuantileSketch::new(DEFAULT_K)?,
            quantiles: vec![q],
            as_list: false,
        })
    }

    /// HyperLogLog distinct count.
    pub fn approx_unique(precision: u8) -> StrataResult<Self> {
        Ok(Self::ApproxUnique {
            prototype: HyperLogLog::new(precision)?,
        })
    }
}

/// A configured aggregation over one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    kind: AggregationKind,
    on: Option<String>,
    group_by: Option<String>,
    name: Option<String>,
}

impl Aggregation {
    pub fn new(kind: AggregationKind, on: impl Into<String>) -> Self {
        Self {
            kind,
            on: Some(on.into()),
            group_by: None,
            name: None,
        }
    }

    /// Count every record.
    pub fn count_records() -> Self {
        Self {
            kind: AggregationKind::Count {
                ignore_nulls: false,
            },
            on: None,
            group_by: None,
            name: None,
        }
    }

    #[must_use]
    pub fn with_group_by(mut self, path: impl Into<String>) -> Self {
        self.group_by = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn aggregation_kind(&self) -> &AggregationKind {
        &self.kind
    }

    /// Declared parameters for an aggregation type.
    pub fn param_schema(type_name: &str) -> StrataResult<ParamSchema> {
        let on = ParamSpec::new("on", ParamType::String)
            .constraint(Constraint::NonEmpty)
            .describe("Field path to aggregate");
        let on = if type_name == "count" { on } else { on.required() };
        let common = ParamSchema::new()
            .param(on)
            .param(
                ParamSpec::new("name", ParamType::String)
                    .constraint(Constraint::NonEmpty)
                    .describe("Result name"),
            )
            .param(
                ParamSpec::new("group_by", ParamType::String)
                    .constraint(Constraint::NonEmpty)
                    .describe("Field path to group results by"),
            );

        let extra = match type_name {
            "count" => ParamSchema::new().param(
                ParamSpec::new("ignore_nulls", ParamType::Bool)
                    .with_default(false)
                    .describe("Count only records where `on` is present and non-null"),
            ),
            "sum" | "mean" | "min" | "max" | "absmax" | "std" => ParamSchema::new(),
            "quantile" => ParamSchema::new()
                .param(
                    ParamSpec::new("q", ParamType::Float)
                        .with_default(0.5)
                        .constraint(Constraint::Ge(0.0))
                        .constraint(Constraint::Le(1.0))
                        .describe("Quantile to report"),
                )
                .param(
                    ParamSpec::new("quantiles", ParamType::FloatList)
                        .constraint(Constraint::Ge(0.0))
                        .constraint(Constraint::Le(1.0))
                        .describe("Several quantiles; the result is a list"),
                )
                .param(
                    ParamSpec::new("k", ParamType::Int)
                        .with_default(DEFAULT_K as i64)
                        .constraint(Constraint::Ge(MIN_K as f64))
                        .describe("Sketch items per level (even)"),
                ),
            "unique" => ParamSchema::new()
                .param(
                    ParamSpec::new("mode", ParamType::String)
                        .with_default("exact")
                        .constraint(Constraint::OneOf(vec![
                            "exact".into(),
                            "approximate".into(),
                        ]))
                        .describe("Exact set or HyperLogLog sketch"),
                )
                .param(
                    ParamSpec::new("max_cardinality", ParamType::Int)
                        .with_default(100_000i64)
                        .constraint(Constraint::Gt(0.0))
                        .describe("Largest exact set before the run fails"),
                )
                .param(
                    ParamSpec::new("output", ParamType::String)
                        .with_default("count")
                        .constraint(Constraint::OneOf(vec!["count".into(), "values".into()]))
                        .describe("Report the distinct count or the sorted values (exact mode)"),
                )
                .param(
                    ParamSpec::new("precision", ParamType::Int)
                        .with_default(i64::from(DEFAULT_PRECISION))
                        .constraint(Constraint::Ge(f64::from(MIN_PRECISION)))
                        .constraint(Constraint::Le(f64::from(MAX_PRECISION)))
                        .describe("HyperLogLog precision (approximate mode)"),
                ),
            "counter" => ParamSchema::new().param(
                ParamSpec::new("top_k", ParamType::Int)
                    .with_default(100i64)
                    .constraint(Constraint::Gt(0.0))
                    .describe("Number of most common keys to report"),
            ),
            other => {
                return Err(StrataError::not_found(
                    "aggregation",
                    other,
                    &AGGREGATION_TYPES.map(|(n, _)| n.to_string()),
                ))
            }
        };
        Ok(common.extend(extra))
    }

    /// Build from validated parameters.
    pub fn from_params(type_name: &str, params: &Params) -> StrataResult<Self> {
        let invalid = |parameter: &str, msg: String| {
            StrataError::invalid_parameter(params.component(), parameter, msg)
        };
        let kind = match type_name {
            "count" => {
                let ignore_nulls = params.bool("ignore_nulls")?;
                if ignore_nulls && params.get("on").is_none() {
                    return Err(invalid("on", "ignore_nulls requires `on`".into()));
                }
                AggregationKind::Count { ignore_nulls }
            }
            "sum" => AggregationKind::Sum,
            "mean" => AggregationKind::Mean,
            "min" => AggregationKind::Min,
            "max" => AggregationKind::Max,
            "absmax" => AggregationKind::AbsMax,
            "std" => AggregationKind::Std,
            "quantile" => {
                let k = params.usize("k")?;
                let prototype =
                    QuantileSketch::new(k).map_err(|e| invalid("k", e.to_string()))?;
                match params.opt_f64_list("quantiles")? {
                    Some(quantiles) if quantiles.is_empty() => {
                        return Err(invalid("quantiles", "must not be empty".into()))
                    }
                    Some(quantiles) => AggregationKind::Quantile {
                        prototype,
                        quantiles,
                        as_list: true,
                    },
                    None => AggregationKind::Quantile {
                        prototype,
                        quantiles: vec![params.f64("q")?],
                        as_list: false,
                    },
                }
            }
            "unique" => match params.str("mode")? {
                "approximate" => {
                    let precision = u8::try_from(params.i64("precision")?)
                        .map_err(|_| invalid("precision", "out of range".into()))?;
                    let prototype = HyperLogLog::new(precision)
                        .map_err(|e| invalid("precision", e.to_string()))?;
                    AggregationKind::ApproxUnique { prototype }
                }
                _ => AggregationKind::ExactUnique {
                    max_cardinality: params.usize("max_cardinality")?,
                    output: match params.str("output")? {
                        "values" => UniqueOutput::Values,
                        _ => UniqueOutput::Count,
                    },
                },
            },
            "counter" => AggregationKind::Counter {
                top_k: params.usize("top_k")?,
            },
            other => {
                return Err(StrataError::not_found(
                    "aggregation",
                    other,
                    &AGGREGATION_TYPES.map(|(n, _)| n.to_string()),
                ))
            }
        };

        Ok(Self {
            kind,
            on: params.opt_str("on")?.map(str::to_string),
            group_by: params.opt_str("group_by")?.map(str::to_string),
            name: params.opt_str("name")?.map(str::to_string),
        })
    }

    /// Present, non-null target value.
    fn value<'r>(&self, record: &'r Record) -> Option<&'r Value> {
        self.on
            .as_deref()
            .and_then(|path| record.get(path))
            .filter(|v| !v.is_null())
    }

    fn number(&self, value: &Value) -> StrataResult<f64> {
        value.as_float64().filter(|_| value.is_numeric()).ok_or_else(|| {
            StrataError::type_error(format!(
                "{} over '{}' expects numbers, got {}",
                self.kind.name(),
                self.on.as_deref().unwrap_or_default(),
                value.type_name()
            ))
        })
    }

    fn init_inner(&self) -> AccumulatorState {
        match &self.kind {
            AggregationKind::Count { .. } => AccumulatorState::Count(0),
            AggregationKind::Sum => AccumulatorState::Sum(SumState::default()),
            AggregationKind::Mean => AccumulatorState::Mean { sum: 0.0, count: 0 },
            AggregationKind::Min | AggregationKind::Max | AggregationKind::AbsMax => {
                AccumulatorState::Extremum(None)
            }
            AggregationKind::Std => AccumulatorState::Welford(WelfordState::default()),
            AggregationKind::Quantile { prototype, .. } => {
                AccumulatorState::Quantile(prototype.clone())
            }
            AggregationKind::ExactUnique { .. } => AccumulatorState::Distinct(BTreeMap::new()),
            AggregationKind::ApproxUnique { prototype } => AccumulatorState::Hll(prototype.clone()),
            AggregationKind::Counter { .. } => AccumulatorState::Counter(BTreeMap::new()),
        }
    }

    fn update_inner(&self, state: &mut AccumulatorState, record: &Record) -> StrataResult<()> {
        if let AccumulatorState::Count(n) = state {
            if let AggregationKind::Count { ignore_nulls } = self.kind {
                if !ignore_nulls || self.value(record).is_some() {
                    *n += 1;
                }
                return Ok(());
            }
        }
        let Some(value) = self.value(record) else {
            return Ok(());
        };

        match state {
            AccumulatorState::Sum(sum) => {
                self.number(value)?;
                sum.add(value)
            }
            AccumulatorState::Mean { sum, count } => {
                *sum += self.number(value)?;
                *count += 1;
                Ok(())
            }
            AccumulatorState::Extremum(current) => {
                let candidate = self.extremum_input(value)?;
                let replace = match current {
                    None => true,
                    Some(existing) => self.prefer(&candidate, existing)?,
                };
                if replace {
                    *current = Some(candidate);
                }
                Ok(())
            }
            AccumulatorState::Welford(w) => {
                w.push(self.number(value)?);
                Ok(())
            }
            AccumulatorState::Quantile(sketch) => sketch.insert(self.number(value)?),
            AccumulatorState::Distinct(set) => {
                let AggregationKind::ExactUnique {
                    max_cardinality, ..
                } = self.kind
                else {
                    return Err(StrataError::internal("distinct state for non-unique kind"));
                };
                let set_len = set.len();
                let entry = set.entry(value.canonical_key());
                if matches!(entry, Entry::Vacant(_)) && set_len >= max_cardinality {
                    return Err(StrataError::merge(format!(
                        "exact unique exceeded max_cardinality={max_cardinality}"
                    )));
                }
                keep_representative(entry, value.clone());
                Ok(())
            }
            AccumulatorState::Hll(hll) => {
                hll.insert(&value.canonical_key());
                Ok(())
            }
            AccumulatorState::Counter(counts) => {
                for (key, n) in counter_entries(value)? {
                    *counts.entry(key).or_insert(0) += n;
                }
                Ok(())
            }
            other => Err(StrataError::internal(format!(
                "{} cannot update a {} state",
                self.kind.name(),
                other.kind_name()
            ))),
        }
    }

    fn extremum_input(&self, value: &Value) -> StrataResult<Value> {
        let accepts_strings = !matches!(self.kind, AggregationKind::AbsMax);
        match value {
            Value::Float64(f) if f.is_nan() => Err(StrataError::value_error(format!(
                "{} input is NaN",
                self.kind.name()
            ))),
            Value::Int64(_) | Value::Float64(_) => Ok(value.clone()),
            Value::String(_) if accepts_strings => Ok(value.clone()),
            other => Err(StrataError::type_error(format!(
                "{} expects {}, got {}",
                self.kind.name(),
                if accepts_strings {
                    "numbers or strings"
                } else {
                    "numbers"
                },
                other.type_name()
            ))),
        }
    }

    /// Whether `candidate` should replace `existing`.
    fn prefer(&self, candidate: &Value, existing: &Value) -> StrataResult<bool> {
        let incomparable = || {
            StrataError::type_error(format!(
                "{} cannot compare {} with {}",
                self.kind.name(),
                candidate.type_name(),
                existing.type_name()
            ))
        };
        let tie = || representation_order(candidate, existing) == Ordering::Less;
        match self.kind {
            AggregationKind::Min => Ok(match candidate.compare(existing).ok_or_else(incomparable)? {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => tie(),
            }),
            AggregationKind::Max => Ok(match candidate.compare(existing).ok_or_else(incomparable)? {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => tie(),
            }),
            AggregationKind::AbsMax => {
                let (c, e) = (self.number(candidate)?, self.number(existing)?);
                Ok(match c.abs().total_cmp(&e.abs()).then_with(|| c.total_cmp(&e)) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => tie(),
                })
            }
            _ => Err(StrataError::internal("extremum state for non-extremum kind")),
        }
    }

    fn combine_inner(
        &self,
        left: AccumulatorState,
        right: AccumulatorState,
    ) -> StrataResult<AccumulatorState> {
        use AccumulatorState as S;
        Ok(match (left, right) {
            (S::Count(a), S::Count(b)) => S::Count(a + b),
            (S::Sum(mut a), S::Sum(b)) => {
                a.merge(b)?;
                S::Sum(a)
            }
            (S::Mean { sum: s1, count: c1 }, S::Mean { sum: s2, count: c2 }) => S::Mean {
                sum: s1 + s2,
                count: c1 + c2,
            },
            (S::Extremum(a), S::Extremum(b)) => S::Extremum(match (a, b) {
                (None, other) | (other, None) => other,
                (Some(a), Some(b)) => {
                    if self.prefer(&b, &a).map_err(|e| StrataError::merge(e.to_string()))? {
                        Some(b)
                    } else {
                        Some(a)
                    }
                }
            }),
            (S::Welford(a), S::Welford(b)) => S::Welford(a.merge(b)),
            (S::Quantile(mut a), S::Quantile(b)) => {
                a.merge(b)?;
                S::Quantile(a)
            }
            (S::Distinct(mut a), S::Distinct(b)) => {
                for (key, value) in b {
                    keep_representative(a.entry(key), value);
                }
                if let AggregationKind::ExactUnique {
                    max_cardinality, ..
                } = self.kind
                {
                    if a.len() > max_cardinality {
                        return Err(StrataError::merge(format!(
                            "exact unique exceeded max_cardinality={max_cardinality}"
                        )));
                    }
                }
                S::Distinct(a)
            }
            (S::Hll(mut a), S::Hll(b)) => {
                a.merge(&b)?;
                S::Hll(a)
            }
            (S::Counter(mut a), S::Counter(b)) => {
                for (key, n) in b {
                    *a.entry(key).or_insert(0) += n;
                }
                S::Counter(a)
            }
            (S::Grouped(mut a), S::Grouped(b)) => {
                for (key, slot) in b {
                    let merged = match a.remove(&key) {
                        Some(existing) => GroupSlot {
                            label: existing.label,
                            state: self.combine_inner(existing.state, slot.state)?,
                        },
                        None => slot,
                    };
                    a.insert(key, merged);
                }
                S::Grouped(a)
            }
            (left, right) => return Err(AccumulatorState::mismatch(&left, &right)),
        })
    }

    fn finalize_inner(&self, state: AccumulatorState) -> StrataResult<Value> {
        let empty = || StrataError::empty_aggregation("");
        match state {
            AccumulatorState::Count(n) => i64::try_from(n)
                .map(Value::Int64)
                .map_err(|_| StrataError::value_error("count overflow")),
            AccumulatorState::Sum(sum) => sum.result(),
            AccumulatorState::Mean { sum, count } => {
                if count == 0 {
                    Err(empty())
                } else {
                    Ok(Value::Float64(sum / count as f64))
                }
            }
            AccumulatorState::Extremum(value) => value.ok_or_else(empty),
            AccumulatorState::Welford(w) => w.std_dev().map(Value::Float64).ok_or_else(empty),
            AccumulatorState::Quantile(sketch) => {
                let AggregationKind::Quantile {
                    quantiles, as_list, ..
                } = &self.kind
                else {
                    return Err(StrataError::internal("quantile state for non-quantile kind"));
                };
                let mut values: Vec<Value> = quantiles
                    .iter()
                    .map(|&q| sketch.quantile(q).map(Value::Float64).ok_or_else(empty))
                    .collect::<StrataResult<_>>()?;
                if *as_list {
                    Ok(Value::Array(values))
                } else {
                    values.pop().ok_or_else(empty)
                }
            }
            AccumulatorState::Distinct(set) => {
                let output = match self.kind {
                    AggregationKind::ExactUnique { output, .. } => output,
                    _ => UniqueOutput::Count,
                };
                match output {
                    UniqueOutput::Count => Ok(Value::from(set.len())),
                    UniqueOutput::Values => {
                        let mut values: Vec<Value> = set.into_values().collect();
                        values.sort_by(total_order);
                        Ok(Value::Array(values))
                    }
                }
            }
            AccumulatorState::Hll(hll) => Ok(Value::Int64(hll.estimate().round() as i64)),
            AccumulatorState::Counter(counts) => {
                let top_k = match self.kind {
                    AggregationKind::Counter { top_k } => top_k,
                    _ => usize::MAX,
                };
                let mut entries: Vec<(String, i64)> = counts.into_iter().collect();
                entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                entries.truncate(top_k);
                Ok(Value::Array(
                    entries
                        .into_iter()
                        .map(|(k, n)| Value::Array(vec![Value::String(k), Value::Int64(n)]))
                        .collect(),
                ))
            }
            AccumulatorState::Grouped(groups) => {
                let labels = group_labels(&groups);
                let mut out = indexmap::IndexMap::with_capacity(groups.len());
                for (slot, label) in groups.into_values().zip(labels) {
                    let value = match self.finalize_inner(slot.state) {
                        Ok(v) => v,
                        Err(StrataError::EmptyAggregation { .. }) => Value::Null,
                        Err(e) => return Err(e),
                    };
                    out.insert(label, value);
                }
                Ok(Value::Map(out))
            }
        }
    }
}

/// Output labels for grouped results, in key order.
///
/// Groups are labelled with their raw string, which can clash between
/// distinct groups (`1` and `"1"`). Clashing groups fall back to their
/// canonical keys; if that still clashes, every group does.
fn group_labels(groups: &BTreeMap<String, GroupSlot>) -> Vec<String> {
    fn has_duplicates(labels: &[&str]) -> bool {
        let mut seen = HashSet::with_capacity(labels.len());
        !labels.iter().all(|label| seen.insert(*label))
    }

    let mut uses: HashMap<&str, usize> = HashMap::with_capacity(groups.len());
    for slot in groups.values() {
        *uses.entry(slot.label.as_str()).or_insert(0) += 1;
    }
    let labels: Vec<&str> = groups
        .iter()
        .map(|(key, slot)| {
            if uses[slot.label.as_str()] > 1 {
                key.as_str()
            } else {
                slot.label.as_str()
            }
        })
        .collect();
    if has_duplicates(&labels) {
        log::warn!("Grouped aggregation labels clash, reporting canonical group keys");
        return groups.keys().cloned().collect();
    }
    labels.into_iter().map(str::to_string).collect()
}

/// Keep one representative per canonical key regardless of arrival order.
fn keep_representative(entry: Entry<'_, String, Value>, value: Value) {
    match entry {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(mut slot) => {
            if representation_order(&value, slot.get()) == Ordering::Less {
                slot.insert(value);
            }
        }
    }
}

/// Order between values that compare equal: integers before floats,
/// element by element for containers.
fn representation_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int64(_), Value::Float64(_)) => Ordering::Less,
        (Value::Float64(_), Value::Int64(_)) => Ordering::Greater,
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(p, q)| representation_order(p, q))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal),
        (Value::Map(x), Value::Map(y)) => x
            .iter()
            .zip(y)
            .map(|((kp, p), (kq, q))| kp.cmp(kq).then_with(|| representation_order(p, q)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Total order for reporting distinct values: numbers, then strings, then
/// everything else by canonical key.
fn total_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int64(_) | Value::Float64(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Map(_) => 5,
        }
    }
    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (x, y) if x.is_numeric() && y.is_numeric() => {
            let (x, y) = (x.as_float64().unwrap_or(0.0), y.as_float64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (x, y) => x.canonical_key().cmp(&y.canonical_key()),
    })
}

/// Decode one counter input into (key, increment) pairs.
fn counter_entries(value: &Value) -> StrataResult<Vec<(String, i64)>> {
    let bad = |what: &str| StrataError::type_error(format!("counter cannot count {what}"));
    match value {
        Value::String(s) => Ok(vec![(s.clone(), 1)]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok((s.clone(), 1)),
                Value::Array(pair) => match pair.as_slice() {
                    [Value::String(k), Value::Int64(n)] => Ok((k.clone(), *n)),
                    _ => Err(bad("an array that is not a [key, count] pair")),
                },
                other => Err(bad(other.type_name())),
            })
            .collect(),
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| {
                v.as_int64()
                    .filter(|_| matches!(v, Value::Int64(_)))
                    .map(|n| (k.clone(), n))
                    .ok_or_else(|| bad(&format!("a {} count", v.type_name())))
            })
            .collect(),
        other => Err(bad(other.type_name())),
    }
}

impl AggregateFn for Aggregation {
    fn kind(&self) -> &str {
        self.kind.name()
    }

    fn target(&self) -> Option<&str> {
        self.on.as_deref()
    }

    fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref()
    }

    fn result_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn init(&self) -> AccumulatorState {
        if self.group_by.is_some() {
            AccumulatorState::Grouped(BTreeMap::new())
        } else {
            self.init_inner()
        }
    }

    fn update(&self, state: &mut AccumulatorState, record: &Record) -> StrataResult<()> {
        let path = match (self.group_by.as_deref(), &*state) {
            (Some(path), AccumulatorState::Grouped(_)) => path,
            _ => return self.update_inner(state, record),
        };
        let AccumulatorState::Grouped(groups) = state else {
            return Err(StrataError::internal("grouped aggregation without grouped state"));
        };

        let group = record.get(path).cloned().unwrap_or(Value::Null);
        let key = group.canonical_key();
        let created = !groups.contains_key(&key);
        let slot = groups.entry(key.clone()).or_insert_with(|| GroupSlot {
            label: match &group {
                Value::String(s) => s.clone(),
                other => other.canonical_key(),
            },
            state: self.init_inner(),
        });
        let result = self.update_inner(&mut slot.state, record);
        if result.is_err() && created {
            groups.remove(&key);
        }
        result
    }

    fn combine(
        &self,
        left: AccumulatorState,
        right: AccumulatorState,
    ) -> StrataResult<AccumulatorState> {
        self.combine_inner(left, right)
    }

    fn finalize(&self, state: AccumulatorState) -> StrataResult<Value> {
        self.finalize_inner(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn params(type_name: &str, pairs: &[(&str, Value)]) -> StrataResult<Aggregation> {
        let raw: IndexMap<String, Value> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        let schema = Aggregation::param_schema(type_name)?;
        let validated = schema.validate(&format!("aggregation.{type_name}"), &raw)?;
        Aggregation::from_params(type_name, &validated)
    }

    fn run(agg: &Aggregation, values: &[Value]) -> StrataResult<Value> {
        let mut state = agg.init();
        for v in values {
            let record = Record::new().with_field("x", v.clone())?;
            agg.update(&mut state, &record)?;
        }
        agg.finalize(state)
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&i| Value::Int64(i)).collect()
    }

    #[test]
    fn test_count_variants() {
        let all = Aggregation::count_records();
        let values = vec![Value::Int64(1), Value::Null, Value::Int64(3)];
        assert_eq!(run(&all, &values).unwrap(), Value::Int64(3));

        let non_null = params(
            "count",
            &[("on", "x".into()), ("ignore_nulls", true.into())],
        )
        .unwrap();
        assert_eq!(run(&non_null, &values).unwrap(), Value::Int64(2));

        let err = params("count", &[("ignore_nulls", true.into())]).unwrap_err();
        assert!(matches!(err, StrataError::InvalidParameter { .. }));
    }

    #[test]
    fn test_sum_mean_skip_nulls() {
        let sum = Aggregation::new(AggregationKind::Sum, "x");
        let mut values = ints(&[1, 2, 3]);
        values.push(Value::Null);
        assert_eq!(run(&sum, &values).unwrap(), Value::Int64(6));

        let mean = Aggregation::new(AggregationKind::Mean, "x");
        assert_eq!(run(&mean, &values).unwrap(), Value::Float64(2.0));
        assert!(matches!(
            run(&mean, &[]),
            Err(StrataError::EmptyAggregation { .. })
        ));
    }

    #[test]
    fn test_numeric_rejects_strings() {
        let sum = Aggregation::new(AggregationKind::Sum, "x");
        let mut state = sum.init();
        let record = Record::with_text("x", "seven");
        let err = sum.update(&mut state, &record).unwrap_err();
        assert!(err.is_record_level());
        assert_eq!(state, sum.init());
    }

    #[test]
    fn test_min_max_strings_and_numbers() {
        let min = Aggregation::new(AggregationKind::Min, "x");
        let max = Aggregation::new(AggregationKind::Max, "x");
        let nums = vec![Value::Int64(3), Value::Float64(-1.5), Value::Int64(2)];
        assert_eq!(run(&min, &nums).unwrap(), Value::Float64(-1.5));
        assert_eq!(run(&max, &nums).unwrap(), Value::Int64(3));

        let words = vec![Value::from("pear"), Value::from("apple")];
        assert_eq!(run(&min, &words).unwrap(), Value::from("apple"));

        let mixed = vec![Value::from("pear"), Value::Int64(1)];
        assert!(matches!(run(&max, &mixed), Err(StrataError::TypeError(_))));
        assert!(matches!(
            run(&max, &[]),
            Err(StrataError::EmptyAggregation { .. })
        ));
    }

    #[test]
    fn test_absmax_prefers_positive_on_tie() {
        let agg = Aggregation::new(AggregationKind::AbsMax, "x");
        assert_eq!(run(&agg, &ints(&[3, -7, 5])).unwrap(), Value::Int64(-7));
        assert_eq!(run(&agg, &ints(&[-4, 4])).unwrap(), Value::Int64(4));
        assert_eq!(run(&agg, &ints(&[4, -4])).unwrap(), Value::Int64(4));
        assert!(run(&agg, &[Value::from("a")]).is_err());
    }

    #[test]
    fn test_std() {
        let agg = Aggregation::new(AggregationKind::Std, "x");
        let v = run(&agg, &ints(&[2, 4, 4, 4, 5, 5, 7, 9])).unwrap();
        assert!((v.as_float64().unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_params() {
        let median = params("quantile", &[("on", "x".into())]).unwrap();
        let values: Vec<Value> = (1..=99).map(Value::Int64).collect();
        assert_eq!(run(&median, &values).unwrap(), Value::Float64(50.0));

        let several = params(
            "quantile",
            &[("on", "x".into()), ("quantiles", vec![0.0, 1.0].into())],
        )
        .unwrap();
        assert_eq!(
            run(&several, &values).unwrap(),
            Value::Array(vec![Value::Float64(1.0), Value::Float64(99.0)])
        );

        assert!(params("quantile", &[("on", "x".into()), ("k", 9i64.into())]).is_err());
        assert!(params("quantile", &[("on", "x".into()), ("q", 1.5.into())]).is_err());
    }

    #[test]
    fn test_unique_exact_values_and_ceiling() {
        let values = params(
            "unique",
            &[("on", "x".into()), ("output", "values".into())],
        )
        .unwrap();
        let input = vec![
            Value::from("b"),
            Value::Int64(2),
            Value::from("a"),
            Value::Float64(2.0),
        ];
        assert_eq!(
            run(&values, &input).unwrap(),
            Value::Array(vec![Value::Int64(2), Value::from("a"), Value::from("b")])
        );

        let capped = params(
            "unique",
            &[("on", "x".into()), ("max_cardinality", 2i64.into())],
        )
        .unwrap();
        let err = run(&capped, &ints(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, StrataError::AggregationMerge { .. }));
        assert!(!err.is_record_level());
    }

    #[test]
    fn test_unique_approximate() {
        let agg = params(
            "unique",
            &[("on", "x".into()), ("mode", "approximate".into())],
        )
        .unwrap();
        let v = run(&agg, &ints(&[1, 1, 2, 3, 3, 3])).unwrap();
        assert_eq!(v, Value::Int64(3));
    }

    #[test]
    fn test_counter_inputs() {
        let agg = params("counter", &[("on", "x".into()), ("top_k", 2i64.into())]).unwrap();
        let mut pairs = IndexMap::new();
        pairs.insert("b".to_string(), Value::Int64(5));
        let input = vec![
            Value::from("a"),
            Value::from(vec!["a", "c"]),
            Value::Map(pairs),
            Value::Array(vec![Value::Array(vec![Value::from("c"), Value::Int64(1)])]),
        ];
        assert_eq!(
            run(&agg, &input).unwrap(),
            Value::Array(vec![
                Value::Array(vec![Value::from("b"), Value::Int64(5)]),
                Value::Array(vec![Value::from("a"), Value::Int64(2)]),
            ])
        );
        assert!(run(&agg, &[Value::Int64(1)]).is_err());
    }

    #[test]
    fn test_group_by() {
        let agg = Aggregation::new(AggregationKind::Sum, "n").with_group_by("lang");
        let mut state = agg.init();
        for (lang, n) in [("en", 1), ("fr", 10), ("en", 2)] {
            let record = Record::with_text("lang", lang).with_field("n", n as i64).unwrap();
            agg.update(&mut state, &record).unwrap();
        }
        let result = agg.finalize(state).unwrap();
        let map = result.as_map().unwrap();
        assert_eq!(map.get("en"), Some(&Value::Int64(3)));
        assert_eq!(map.get("fr"), Some(&Value::Int64(10)));
    }

    #[test]
    fn test_group_labels_never_collide() {
        let agg = Aggregation::new(AggregationKind::Sum, "n").with_group_by("g");
        let mut state = agg.init();
        let rows = [
            (Value::Int64(1), 1),
            (Value::from("1"), 10),
            (Value::Null, 100),
            (Value::from("null"), 1000),
            (Value::from("en"), 5),
        ];
        for (group, n) in rows {
            let record = Record::new()
                .with_field("g", group)
                .unwrap()
                .with_field("n", n as i64)
                .unwrap();
            agg.update(&mut state, &record).unwrap();
        }
        let result = agg.finalize(state).unwrap();
        let map = result.as_map().unwrap();

        assert_eq!(map.len(), 5);
        assert_eq!(map.get("1"), Some(&Value::Int64(1)));
        assert_eq!(map.get("\"1\""), Some(&Value::Int64(10)));
        assert_eq!(map.get("null"), Some(&Value::Int64(100)));
        assert_eq!(map.get("\"null\""), Some(&Value::Int64(1000)));
        assert_eq!(map.get("en"), Some(&Value::Int64(5)));
    }

    #[test]
    fn test_equal_values_keep_one_representation() {
        let unique = params(
            "unique",
            &[("on", "x".into()), ("output", "values".into())],
        )
        .unwrap();
        let min = Aggregation::new(AggregationKind::Min, "x");
        let max = Aggregation::new(AggregationKind::Max, "x");

        for agg in [&unique, &min, &max] {
            let fold = |values: &[Value]| {
                let mut state = agg.init();
                for v in values {
                    let record = Record::new().with_field("x", v.clone()).unwrap();
                    agg.update(&mut state, &record).unwrap();
                }
                state
            };
            let int_side = fold(&[Value::Int64(2)]);
            let float_side = fold(&[Value::Float64(2.0)]);

            let left = agg
                .finalize(agg.combine(int_side.clone(), float_side.clone()).unwrap())
                .unwrap();
            let right = agg
                .finalize(agg.combine(float_side, int_side).unwrap())
                .unwrap();
            assert_eq!(left, right, "{}", agg.kind());
            assert_eq!(
                run(agg, &[Value::Float64(2.0), Value::Int64(2)]).unwrap(),
                left,
                "{}",
                agg.kind()
            );
        }
        assert_eq!(
            run(&min, &[Value::Float64(2.0), Value::Int64(2)]).unwrap(),
            Value::Int64(2)
        );
    }

    #[test]
    fn test_combine_mismatch() {
        let sum = Aggregation::new(AggregationKind::Sum, "x");
        let err = sum
            .combine(AccumulatorState::Count(1), sum.init())
            .unwrap_err();
        assert!(matches!(err, StrataError::AggregationMerge { .. }));
    }

    #[test]
    fn test_unknown_type() {
        assert!(matches!(
            Aggregation::param_schema("median"),
            Err(StrataError::ComponentNotFound { .. })
        ));
    }
}
