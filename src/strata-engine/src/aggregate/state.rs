//! Partial aggregation states.

use std::collections::BTreeMap;

use common_error::{StrataError, StrataResult};
use strata_core::Value;

use super::hll::HyperLogLog;
use super::quantile::QuantileSketch;

/// Exact running sum.
///
/// Integers are summed in `i128` so only the final conversion can overflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SumState {
    pub int_total: i128,
    pub float_total: f64,
    pub has_float: bool,
}

impl SumState {
    pub fn add(&mut self, value: &Value) -> StrataResult<()> {
        match value {
            Value::Int64(i) => {
                self.int_total = self
                    .int_total
                    .checked_add(i128::from(*i))
                    .ok_or_else(|| StrataError::value_error("integer sum overflow"))?;
            }
            Value::Float64(f) => {
                self.float_total += f;
                self.has_float = true;
            }
            other => {
                return Err(StrataError::type_error(format!(
                    "expected a number, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: Self) -> StrataResult<()> {
        self.int_total = self
            .int_total
            .checked_add(other.int_total)
            .ok_or_else(|| StrataError::value_error("integer sum overflow"))?;
        self.float_total += other.float_total;
        self.has_float |= other.has_float;
        Ok(())
    }

    pub fn result(&self) -> StrataResult<Value> {
        if self.has_float {
            Ok(Value::Float64(self.int_total as f64 + self.float_total))
        } else {
            i64::try_from(self.int_total).map(Value::Int64).map_err(|_| {
                StrataError::value_error(format!(
                    "sum {} does not fit in a 64-bit integer",
                    self.int_total
                ))
            })
        }
    }
}

/// Running (count, mean, M2) for population standard deviation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WelfordState {
    pub count: u64,
    pub mean: f64,
    pub m2: f64,
}

impl WelfordState {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Chan et al. parallel combination.
    pub fn merge(self, other: Self) -> Self {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let (n1, n2) = (self.count as f64, other.count as f64);
        let n = n1 + n2;
        let delta = other.mean - self.mean;
        Self {
            count: self.count + other.count,
            mean: self.mean + delta * n2 / n,
            m2: self.m2 + other.m2 + delta * delta * n1 * n2 / n,
        }
    }

    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.m2 / self.count as f64).sqrt())
    }
}

/// One group of a grouped aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSlot {
    /// Output key for the group.
    pub label: String,
    pub state: AccumulatorState,
}

/// Mergeable partial state of one aggregation over one partition.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorState {
    Count(u64),
    Sum(SumState),
    Mean { sum: f64, count: u64 },
    /// Current extremum for min, max and absmax.
    Extremum(Option<Value>),
    Welford(WelfordState),
    Quantile(QuantileSketch),
    /// Distinct values by canonical key.
    Distinct(BTreeMap<String, Value>),
    Hll(HyperLogLog),
    Counter(BTreeMap<String, i64>),
    /// Per-group states keyed by canonical group key.
    Grouped(BTreeMap<String, GroupSlot>),
}

impl AccumulatorState {
    /// Variant name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Count(_) => "count",
            Self::Sum(_) => "sum",
            Self::Mean { .. } => "mean",
            Self::Extremum(_) => "extremum",
            Self::Welford(_) => "welford",
            Self::Quantile(_) => "quantile",
            Self::Distinct(_) => "distinct",
            Self::Hll(_) => "hyperloglog",
            Self::Counter(_) => "counter",
            Self::Grouped(_) => "grouped",
        }
    }

    pub(crate) fn mismatch(left: &Self, right: &Self) -> StrataError {
        StrataError::merge(format!(
            "cannot combine a {} state with a {} state",
            left.kind_name(),
            right.kind_name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_int_and_float() {
        let mut s = SumState::default();
        s.add(&Value::Int64(2)).unwrap();
        s.add(&Value::Int64(3)).unwrap();
        assert_eq!(s.result().unwrap(), Value::Int64(5));
        s.add(&Value::Float64(0.5)).unwrap();
        assert_eq!(s.result().unwrap(), Value::Float64(5.5));
    }

    #[test]
    fn test_sum_overflow_at_result() {
        let mut s = SumState::default();
        s.add(&Value::Int64(i64::MAX)).unwrap();
        s.add(&Value::Int64(1)).unwrap();
        assert!(matches!(s.result(), Err(StrataError::ValueError(_))));

        s.add(&Value::Int64(-1)).unwrap();
        assert_eq!(s.result().unwrap(), Value::Int64(i64::MAX));
    }

    #[test]
    fn test_sum_rejects_strings() {
        let mut s = SumState::default();
        assert!(matches!(
            s.add(&Value::from("x")),
            Err(StrataError::TypeError(_))
        ));
    }

    #[test]
    fn test_welford_known_value() {
        let mut w = WelfordState::default();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            w.push(x);
        }
        assert!((w.std_dev().unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_welford_merge_matches_single_pass() {
        let data = [1.5, 2.0, 8.25, -3.0, 4.0, 11.0, 0.0];
        let mut whole = WelfordState::default();
        data.iter().for_each(|&x| whole.push(x));

        let (mut a, mut b) = (WelfordState::default(), WelfordState::default());
        data[..3].iter().for_each(|&x| a.push(x));
        data[3..].iter().for_each(|&x| b.push(x));
        let merged = a.merge(b);

        assert_eq!(merged.count, whole.count);
        assert!((merged.mean - whole.mean).abs() < 1e-12);
        assert!((merged.m2 - whole.m2).abs() < 1e-9);
        assert_eq!(WelfordState::default().std_dev(), None);
    }
}
