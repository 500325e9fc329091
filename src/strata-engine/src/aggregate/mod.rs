//! Aggregation engine.
//!
//! Each aggregation stage gets one [`Accumulator`] per partition. Workers
//! update their partition's accumulator; when every partition has finished,
//! the executor folds them with [`merge_tree`] and finalizes the survivor
//! exactly once.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──update──▶ Accumulating ──merge──▶ Merging ──finalize──▶ Finalized
//!    │                                                                ▲
//!    └──────────────────────────── finalize ─────────────────────────┘
//! ```
//!
//! Updating after a merge, merging after finalize, and finalizing twice fail
//! with `InvalidStateError`.

mod functions;
mod hll;
mod quantile;
mod state;

use std::sync::Arc;

use common_error::{StrataError, StrataResult};
use strata_core::{Record, Value};
use strata_logical::ComponentCategory;

use crate::registry::Registry;
use crate::stages::AggregateFn;

pub use functions::{Aggregation, AggregationKind, UniqueOutput, AGGREGATION_TYPES};
pub use hll::HyperLogLog;
pub use quantile::QuantileSketch;
pub use state::{AccumulatorState, GroupSlot, SumState, WelfordState};

/// Lifecycle phase of an [`Accumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorPhase {
    Created,
    Accumulating,
    Merging,
    Finalized,
}

impl std::fmt::Display for AccumulatorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::Accumulating => "Accumulating",
            Self::Merging => "Merging",
            Self::Finalized => "Finalized",
        };
        f.write_str(name)
    }
}

/// State of one aggregation stage over one partition, with lifecycle checks.
#[derive(Debug)]
pub struct Accumulator {
    stage: String,
    func: Arc<dyn AggregateFn>,
    state: Option<AccumulatorState>,
    phase: AccumulatorPhase,
}

impl Accumulator {
    pub fn new(stage: impl Into<String>, func: Arc<dyn AggregateFn>) -> Self {
        let state = Some(func.init());
        Self {
            stage: stage.into(),
            func,
            state,
            phase: AccumulatorPhase::Created,
        }
    }

    /// Stage this accumulator belongs to.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn phase(&self) -> AccumulatorPhase {
        self.phase
    }

    /// Current partial state, `None` once finalized.
    pub fn state(&self) -> Option<&AccumulatorState> {
        self.state.as_ref()
    }

    fn lifecycle_error(&self, action: &str) -> StrataError {
        StrataError::invalid_state(format!(
            "cannot {action} accumulator of stage '{}' in phase {}",
            self.stage, self.phase
        ))
    }

    /// Fold one record in.
    pub fn update(&mut self, record: &Record) -> StrataResult<()> {
        if !matches!(
            self.phase,
            AccumulatorPhase::Created | AccumulatorPhase::Accumulating
        ) {
            return Err(self.lifecycle_error("update"));
        }
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| StrataError::internal("accumulator lost its state"))?;
        self.func
            .update(state, record)
            .map_err(|e| e.in_stage(&self.stage))?;
        self.phase = AccumulatorPhase::Accumulating;
        Ok(())
    }

    /// Absorb another accumulator of the same stage.
    pub fn merge(&mut self, mut other: Accumulator) -> StrataResult<()> {
        if self.phase == AccumulatorPhase::Finalized {
            return Err(self.lifecycle_error("merge into"));
        }
        if other.phase == AccumulatorPhase::Finalized {
            return Err(other.lifecycle_error("merge from"));
        }
        if other.stage != self.stage {
            return Err(StrataError::merge(format!(
                "cannot merge accumulators of stages '{}' and '{}'",
                self.stage, other.stage
            ))
            .in_stage(&self.stage));
        }
        let (Some(left), Some(right)) = (self.state.take(), other.state.take()) else {
            return Err(StrataError::internal("accumulator lost its state"));
        };
        self.phase = AccumulatorPhase::Merging;
        let combined = self
            .func
            .combine(left, right)
            .map_err(|e| e.in_stage(&self.stage))?;
        self.state = Some(combined);
        Ok(())
    }

    /// Produce the result. Allowed exactly once.
    pub fn finalize(&mut self) -> StrataResult<Value> {
        if self.phase == AccumulatorPhase::Finalized {
            return Err(self.lifecycle_error("finalize"));
        }
        self.phase = AccumulatorPhase::Finalized;
        let state = self
            .state
            .take()
            .ok_or_else(|| StrataError::internal("accumulator lost its state"))?;
        self.func.finalize(state).map_err(|e| e.in_stage(&self.stage))
    }
}

/// Combine accumulators pairwise, round by round, until one is left.
///
/// Returns `None` for an empty input.
pub fn merge_tree(mut level: Vec<Accumulator>) -> StrataResult<Option<Accumulator>> {
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut items = level.into_iter();
        while let Some(mut left) = items.next() {
            if let Some(right) = items.next() {
                left.merge(right)?;
            }
            next.push(left);
        }
        level = next;
    }
    Ok(level.pop())
}

/// Register every built-in aggregation type.
pub fn register_aggregations(registry: &mut Registry) -> StrataResult<()> {
    for (type_name, description) in AGGREGATION_TYPES {
        let schema = Aggregation::param_schema(type_name)?;
        registry.register_aggregate(
            ComponentCategory::Aggregation,
            type_name,
            description,
            schema,
            move |params| {
                Ok(Arc::new(Aggregation::from_params(type_name, params)?) as Arc<dyn AggregateFn>)
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_acc() -> Accumulator {
        Accumulator::new("total", Arc::new(Aggregation::new(AggregationKind::Sum, "n")))
    }

    fn record(n: i64) -> Record {
        Record::new().with_field("n", n).unwrap()
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut acc = sum_acc();
        assert_eq!(acc.phase(), AccumulatorPhase::Created);
        acc.update(&record(2)).unwrap();
        assert_eq!(acc.phase(), AccumulatorPhase::Accumulating);

        let mut other = sum_acc();
        other.update(&record(3)).unwrap();
        acc.merge(other).unwrap();
        assert_eq!(acc.phase(), AccumulatorPhase::Merging);

        let err = acc.update(&record(1)).unwrap_err();
        assert!(matches!(err, StrataError::InvalidState(_)));

        assert_eq!(acc.finalize().unwrap(), Value::Int64(5));
        assert_eq!(acc.phase(), AccumulatorPhase::Finalized);
        assert!(matches!(acc.finalize(), Err(StrataError::InvalidState(_))));
        assert!(matches!(acc.merge(sum_acc()), Err(StrataError::InvalidState(_))));
        assert!(matches!(acc.update(&record(1)), Err(StrataError::InvalidState(_))));
    }

    #[test]
    fn test_created_finalizes_directly() {
        let mut acc = Accumulator::new("n", Arc::new(Aggregation::count_records()));
        assert_eq!(acc.finalize().unwrap(), Value::Int64(0));
    }

    #[test]
    fn test_empty_error_carries_stage() {
        let mut acc = Accumulator::new("avg", Arc::new(Aggregation::new(AggregationKind::Mean, "n")));
        match acc.finalize() {
            Err(StrataError::EmptyAggregation { stage }) => assert_eq!(stage, "avg"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_merge_tree_odd_count() {
        let accs: Vec<_> = (1..=5)
            .map(|i| {
                let mut acc = sum_acc();
                acc.update(&record(i)).unwrap();
                acc
            })
            .collect();
        let mut root = merge_tree(accs).unwrap().unwrap();
        assert_eq!(root.finalize().unwrap(), Value::Int64(15));
        assert!(merge_tree(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_merge_kind_mismatch_is_fatal() {
        let mut acc = sum_acc();
        let other = Accumulator::new("total", Arc::new(Aggregation::count_records()));
        let err = acc.merge(other).unwrap_err();
        assert!(matches!(err, StrataError::AggregationMerge { ref stage, .. } if stage == "total"));
    }
}
