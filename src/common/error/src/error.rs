//! Core error types for Strata.

use std::fmt;

use thiserror::Error;

/// Result type alias using `StrataError`.
pub type StrataResult<T> = std::result::Result<T, StrataError>;

/// Position of a record inside the run: the partition it arrived in and its
/// offset within that partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordLocator {
    /// Partition sequence number, in reader order.
    pub partition: usize,
    /// Offset of the record inside the partition.
    pub record: usize,
}

impl RecordLocator {
    /// Create a new locator.
    pub const fn new(partition: usize, record: usize) -> Self {
        Self { partition, record }
    }
}

impl fmt::Display for RecordLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition {}, record {}", self.partition, self.record)
    }
}

/// Core error type for Strata operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StrataError {
    /// Malformed pipeline description.
    #[error("ConfigError: {0}")]
    Config(String),

    /// No component registered under (category, name).
    #[error("ComponentNotFoundError: no {category} component named '{name}' (available: {available})")]
    ComponentNotFound {
        category: String,
        name: String,
        available: String,
    },

    /// (category, name) registered twice.
    #[error("DuplicateComponentError: {category} component '{name}' is already registered")]
    DuplicateComponent { category: String, name: String },

    /// A parameter violates its declared schema.
    #[error("InvalidParameterError: {component}.{parameter}: {message}")]
    InvalidParameter {
        component: String,
        parameter: String,
        message: String,
    },

    /// Stage placed where its inputs cannot exist, or a connector out of place.
    #[error("StageOrderError: stage '{stage}': {message}")]
    StageOrder { stage: String, message: String },

    /// A stage failed on one record. Subject to the run's failure policy.
    #[error("RecordProcessingError: stage '{stage}' at {locator}: {message}")]
    RecordProcessing {
        stage: String,
        locator: RecordLocator,
        message: String,
    },

    /// Two partial aggregation states could not be combined. Always fatal.
    #[error("AggregationMergeError: stage '{stage}': {message}")]
    AggregationMerge { stage: String, message: String },

    /// Reader or writer boundary failure.
    #[error("IOError: {0}")]
    Io(String),

    /// An aggregation that needs at least one value was finalized empty.
    #[error("EmptyAggregationError: stage '{stage}' has no input values")]
    EmptyAggregation { stage: String },

    /// Lifecycle violation (e.g. updating a finalized accumulator). Always fatal.
    #[error("InvalidStateError: {0}")]
    InvalidState(String),

    /// The run was cancelled.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Type mismatch inside a component.
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Invalid value inside a component.
    #[error("ValueError: {0}")]
    ValueError(String),

    /// JSON/YAML (de)serialization failure.
    #[error("SerializationError: {0}")]
    Serialization(String),

    /// Internal error (bug in Strata).
    #[error("InternalError: {0}")]
    Internal(String),
}

impl StrataError {
    /// Create a new `ConfigError`.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new `ComponentNotFound` error.
    pub fn not_found<C, N>(category: C, name: N, available: &[String]) -> Self
    where
        C: Into<String>,
        N: Into<String>,
    {
        let available = if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        };
        Self::ComponentNotFound {
            category: category.into(),
            name: name.into(),
            available,
        }
    }

    /// Create a new `DuplicateComponent` error.
    pub fn duplicate<C: Into<String>, N: Into<String>>(category: C, name: N) -> Self {
        Self::DuplicateComponent {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<C, P, M>(component: C, parameter: P, message: M) -> Self
    where
        C: Into<String>,
        P: Into<String>,
        M: Into<String>,
    {
        Self::InvalidParameter {
            component: component.into(),
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a new `StageOrder` error.
    pub fn stage_order<S: Into<String>, M: Into<String>>(stage: S, message: M) -> Self {
        Self::StageOrder {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Wrap a component failure into a `RecordProcessing` error.
    pub fn record_processing<S: Into<String>>(
        stage: S,
        locator: RecordLocator,
        source: &StrataError,
    ) -> Self {
        Self::RecordProcessing {
            stage: stage.into(),
            locator,
            message: source.to_string(),
        }
    }

    /// Create a new `AggregationMerge` error. The stage is filled in by the
    /// owning accumulator through [`StrataError::in_stage`].
    pub fn merge<S: Into<String>>(msg: S) -> Self {
        Self::AggregationMerge {
            stage: String::new(),
            message: msg.into(),
        }
    }

    /// Create a new `EmptyAggregation` error.
    pub fn empty_aggregation<S: Into<String>>(stage: S) -> Self {
        Self::EmptyAggregation {
            stage: stage.into(),
        }
    }

    /// Create a new `IOError`.
    pub fn io<S: Into<String>>(msg: S) -> Self {
        Self::Io(msg.into())
    }

    /// Create a new `InvalidStateError`.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a cancellation error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a new `TypeError`.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a new `ValueError`.
    pub fn value_error<S: Into<String>>(msg: S) -> Self {
        Self::ValueError(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Attach a stage name to stage-scoped errors that were raised without one.
    #[must_use]
    pub fn in_stage(self, name: &str) -> Self {
        match self {
            Self::AggregationMerge { stage, message } if stage.is_empty() => {
                Self::AggregationMerge {
                    stage: name.to_string(),
                    message,
                }
            }
            Self::EmptyAggregation { stage } if stage.is_empty() => Self::EmptyAggregation {
                stage: name.to_string(),
            },
            Self::StageOrder { stage, message } if stage.is_empty() => Self::StageOrder {
                stage: name.to_string(),
                message,
            },
            other => other,
        }
    }

    /// Whether the failure policy may skip this error for a single record.
    ///
    /// Merge, lifecycle, I/O and configuration errors are never skippable.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Self::TypeError(_)
                | Self::ValueError(_)
                | Self::Serialization(_)
                | Self::RecordProcessing { .. }
        )
    }

    /// Stage name carried by the error, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageOrder { stage, .. }
            | Self::RecordProcessing { stage, .. }
            | Self::AggregationMerge { stage, .. }
            | Self::EmptyAggregation { stage } => Some(stage),
            Self::InvalidParameter { component, .. } => Some(component),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StrataError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for StrataError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Ensure a condition holds, returning a `ValueError` if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::StrataError::ValueError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::StrataError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with a `ValueError`.
#[macro_export]
macro_rules! value_err {
    ($($arg:tt)*) => {
        return Err($crate::StrataError::ValueError(format!($($arg)*)))
    };
}

/// Return early with a `TypeError`.
#[macro_export]
macro_rules! type_err {
    ($($arg:tt)*) => {
        return Err($crate::StrataError::TypeError(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StrataError::type_error("expected Int64, got String");
        assert_eq!(err.to_string(), "TypeError: expected Int64, got String");

        let err = StrataError::invalid_parameter("filter.token_count", "min_tokens", "must be > 0");
        assert_eq!(
            err.to_string(),
            "InvalidParameterError: filter.token_count.min_tokens: must be > 0"
        );
    }

    #[test]
    fn test_record_locator_in_message() {
        let source = StrataError::value_error("boom");
        let err = StrataError::record_processing("tag.length", RecordLocator::new(3, 17), &source);
        let msg = err.to_string();
        assert!(msg.contains("tag.length"));
        assert!(msg.contains("partition 3, record 17"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_not_found_lists_available() {
        let err = StrataError::not_found("tagger", "lang", &["language".into(), "length".into()]);
        assert!(err.to_string().contains("language, length"));
        let err = StrataError::not_found("tagger", "lang", &[]);
        assert!(err.to_string().contains("available: none"));
    }

    #[test]
    fn test_in_stage_fills_only_empty() {
        let err = StrataError::merge("kind mismatch").in_stage("aggregation.mean");
        assert_eq!(err.stage(), Some("aggregation.mean"));

        let err = StrataError::empty_aggregation("a").in_stage("b");
        assert_eq!(err.stage(), Some("a"));
    }

    #[test]
    fn test_record_level_classification() {
        assert!(StrataError::type_error("x").is_record_level());
        assert!(StrataError::value_error("x").is_record_level());
        assert!(!StrataError::merge("x").is_record_level());
        assert!(!StrataError::invalid_state("x").is_record_level());
        assert!(!StrataError::io("x").is_record_level());
    }

    #[test]
    fn test_ensure_macro() {
        fn check(n: i64) -> StrataResult<i64> {
            crate::ensure!(n > 0, "n must be positive");
            crate::ensure!(n < 10, InvalidState: "n={} too large", n);
            Ok(n)
        }
        assert!(check(5).is_ok());
        assert!(matches!(check(0), Err(StrataError::ValueError(_))));
        assert!(matches!(check(11), Err(StrataError::InvalidState(_))));
    }
}
