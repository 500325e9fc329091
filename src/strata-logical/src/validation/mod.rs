//! Validation layer for pipeline descriptions.
//!
//! # Validation Categories
//!
//! ## Structural Validation
//!
//! - Required names and formats present
//! - Readers and writers only at the ends of the pipeline
//! - `aggregations` holds only aggregation descriptors
//!
//! ## Schema-flow Validation
//!
//! - Stages read fields that exist by the time they run
//! - Taggers never overwrite known fields
//!
//! Schema-flow validation needs instantiated stages, so the compiler runs it
//! after resolving every descriptor.

mod schema_flow;
mod structural;

pub use schema_flow::{SchemaFlowError, SchemaFlowValidator, StageFields};
pub use structural::{StructuralValidationError, StructuralValidator};

use common_error::{StrataError, StrataResult};

use crate::PipelineConfig;

impl From<StructuralValidationError> for StrataError {
    fn from(e: StructuralValidationError) -> Self {
        match &e {
            StructuralValidationError::ConnectorAsStage { type_name, .. } => {
                StrataError::stage_order(type_name.as_str(), e.to_string())
            }
            StructuralValidationError::NonAggregationInAggregations { index, .. } => {
                StrataError::stage_order(format!("aggregations[{index}]"), e.to_string())
            }
            _ => StrataError::config(e.to_string()),
        }
    }
}

impl From<SchemaFlowError> for StrataError {
    fn from(e: SchemaFlowError) -> Self {
        StrataError::stage_order(e.stage(), e.to_string())
    }
}

/// Run structural validation, surfacing the first error.
///
/// Ordering errors take precedence so a misplaced writer is reported as a
/// `StageOrderError` even when other fields are also malformed.
pub fn validate_structure(config: &PipelineConfig) -> StrataResult<()> {
    match StructuralValidator::validate(config) {
        Ok(()) => Ok(()),
        Err(errors) => {
            let first = errors
                .iter()
                .find(|e| e.is_ordering())
                .or_else(|| errors.first())
                .cloned()
                .ok_or_else(|| StrataError::internal("validator returned no errors"))?;
            Err(first.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComponentCategory, ComponentDescriptor, ConnectorConfig};

    #[test]
    fn test_ordering_error_wins() {
        let config = PipelineConfig::new("", ConnectorConfig::new("jsonl"))
            .with_stage(ComponentDescriptor::new(ComponentCategory::Writer, "jsonl"));
        let err = validate_structure(&config).unwrap_err();
        assert!(matches!(err, StrataError::StageOrder { .. }));
    }

    #[test]
    fn test_config_error() {
        let config = PipelineConfig::new("", ConnectorConfig::new("jsonl"));
        assert!(matches!(
            validate_structure(&config),
            Err(StrataError::Config(_))
        ));
    }
}
