//! Stage contracts.
//!
//! Every planned stage is one of three capabilities:
//!
//! - [`MapFn`]: one record in, zero or one record out (extractors, taggers,
//!   formatters)
//! - [`FilterFn`]: keep or drop (filters)
//! - [`AggregateFn`]: fold records into a mergeable state (aggregations)
//!
//! Stage objects are built once per run by the compiler and shared read-only
//! across workers, hence the `Send + Sync` bounds. Per-partition mutable state
//! lives in [`AccumulatorState`] values owned by the executor, never in the
//! stage object itself.

use std::fmt::Debug;
use std::sync::Arc;

use common_error::StrataResult;
use strata_core::{Record, Value};
use strata_logical::StageKind;

use crate::aggregate::AccumulatorState;

/// A record-to-record transform.
pub trait MapFn: Send + Sync + Debug {
    /// Transform one record. `Ok(None)` drops it.
    fn apply(&self, record: &Record) -> StrataResult<Option<Record>>;

    /// Field paths the transform reads.
    fn input_fields(&self) -> Vec<String> {
        Vec::new()
    }

    /// Field paths the transform writes.
    fn output_fields(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A keep/drop predicate.
pub trait FilterFn: Send + Sync + Debug {
    /// Whether the record survives.
    fn keep(&self, record: &Record) -> StrataResult<bool>;

    /// Field paths the predicate reads.
    fn input_fields(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A mergeable fold over records.
///
/// `combine` must be associative and commutative (exactly for integer and
/// set states, within floating-point tolerance otherwise) so partial states
/// can be merged in any tree shape.
pub trait AggregateFn: Send + Sync + Debug {
    /// Aggregation type, e.g. `mean`.
    fn kind(&self) -> &str;

    /// Field path the aggregation reads.
    fn target(&self) -> Option<&str>;

    /// Field path results are grouped by.
    fn group_by(&self) -> Option<&str> {
        None
    }

    /// Preferred result name, if configured.
    fn result_name(&self) -> Option<&str> {
        None
    }

    /// Fresh, empty state.
    fn init(&self) -> AccumulatorState;

    /// Fold one record into `state`.
    ///
    /// On error the state is left as it was before the call.
    fn update(&self, state: &mut AccumulatorState, record: &Record) -> StrataResult<()>;

    /// Merge two partial states.
    fn combine(&self, left: AccumulatorState, right: AccumulatorState)
        -> StrataResult<AccumulatorState>;

    /// Produce the final result.
    fn finalize(&self, state: AccumulatorState) -> StrataResult<Value>;

    /// Field paths the aggregation reads.
    fn input_fields(&self) -> Vec<String> {
        self.target()
            .into_iter()
            .chain(self.group_by())
            .map(str::to_string)
            .collect()
    }
}

/// An instantiated stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Map(Arc<dyn MapFn>),
    Filter(Arc<dyn FilterFn>),
    Aggregate(Arc<dyn AggregateFn>),
}

impl Stage {
    /// Capability of this stage.
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Map(_) => StageKind::Map,
            Self::Filter(_) => StageKind::Filter,
            Self::Aggregate(_) => StageKind::Aggregate,
        }
    }

    /// Declared input field paths.
    pub fn consumes(&self) -> Vec<String> {
        match self {
            Self::Map(f) => f.input_fields(),
            Self::Filter(f) => f.input_fields(),
            Self::Aggregate(f) => f.input_fields(),
        }
    }

    /// Declared output field paths.
    pub fn produces(&self) -> Vec<String> {
        match self {
            Self::Map(f) => f.output_fields(),
            Self::Filter(_) | Self::Aggregate(_) => Vec::new(),
        }
    }

    /// The aggregation function, if this is an aggregate stage.
    pub fn as_aggregate(&self) -> Option<&Arc<dyn AggregateFn>> {
        match self {
            Self::Aggregate(f) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Upper;

    impl MapFn for Upper {
        fn apply(&self, record: &Record) -> StrataResult<Option<Record>> {
            let text = record.get_str("text").unwrap_or_default().to_uppercase();
            Ok(Some(record.clone().with_field("text", text)?))
        }

        fn input_fields(&self) -> Vec<String> {
            vec!["text".into()]
        }

        fn output_fields(&self) -> Vec<String> {
            vec!["text".into()]
        }
    }

    #[derive(Debug)]
    struct NonEmpty;

    impl FilterFn for NonEmpty {
        fn keep(&self, record: &Record) -> StrataResult<bool> {
            Ok(record.get_str("text").is_some_and(|t| !t.is_empty()))
        }
    }

    #[test]
    fn test_stage_kinds_and_fields() {
        let map = Stage::Map(Arc::new(Upper));
        assert_eq!(map.kind(), StageKind::Map);
        assert_eq!(map.consumes(), vec!["text".to_string()]);
        assert_eq!(map.produces(), vec!["text".to_string()]);

        let filter = Stage::Filter(Arc::new(NonEmpty));
        assert_eq!(filter.kind(), StageKind::Filter);
        assert!(filter.consumes().is_empty());
        assert!(filter.as_aggregate().is_none());
    }
}
