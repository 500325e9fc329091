//! Structural validation for pipeline descriptions.
//!
//! Checks that need no registry: names present, connectors only at the
//! ends, aggregation lists holding aggregations.

use crate::pipeline::{ComponentCategory, PipelineConfig};

/// A structural validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralValidationError {
    /// Pipeline has no name.
    EmptyName,

    /// Input connector has no format.
    MissingInputFormat,

    /// Output connector has no format.
    MissingOutputFormat,

    /// A stage descriptor has no type.
    EmptyType {
        /// Position in the stage list.
        index: usize,
    },

    /// A reader or writer appears among the stages.
    ConnectorAsStage {
        /// Position in the stage list.
        index: usize,
        /// Offending category.
        category: ComponentCategory,
        /// Descriptor type.
        type_name: String,
    },

    /// The `aggregations` list holds a non-aggregation descriptor.
    NonAggregationInAggregations {
        /// Position in the aggregations list.
        index: usize,
        /// Offending category.
        category: ComponentCategory,
    },

    /// `execution.parallelism` is zero.
    ZeroParallelism,
}

impl StructuralValidationError {
    /// Whether this is a misplacement rather than a malformed field.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::ConnectorAsStage { .. } | Self::NonAggregationInAggregations { .. }
        )
    }
}

impl std::fmt::Display for StructuralValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "pipeline name must not be empty"),
            Self::MissingInputFormat => write!(f, "input.format must not be empty"),
            Self::MissingOutputFormat => write!(f, "output.format must not be empty"),
            Self::EmptyType { index } => write!(f, "processor #{index} has an empty type"),
            Self::ConnectorAsStage {
                index,
                category,
                type_name,
            } => write!(
                f,
                "processor #{index} is a {category} ('{type_name}'); {category}s belong in {}",
                if *category == ComponentCategory::Writer {
                    "`output` and must be last"
                } else {
                    "`input` and must be first"
                }
            ),
            Self::NonAggregationInAggregations { index, category } => write!(
                f,
                "aggregations #{index} has category {category}; only aggregation descriptors are allowed"
            ),
            Self::ZeroParallelism => write!(f, "execution.parallelism must be > 0"),
        }
    }
}

impl std::error::Error for StructuralValidationError {}

/// Structural validator for pipeline descriptions.
pub struct StructuralValidator;

impl StructuralValidator {
    /// Validate a pipeline description.
    ///
    /// Returns `Ok(())` if it is structurally valid, or every error found.
    pub fn validate(config: &PipelineConfig) -> Result<(), Vec<StructuralValidationError>> {
        let mut errors = Vec::new();

        if config.name.trim().is_empty() {
            errors.push(StructuralValidationError::EmptyName);
        }
        if config.input.format.trim().is_empty() {
            errors.push(StructuralValidationError::MissingInputFormat);
        }
        if let Some(output) = &config.output {
            if output.format.trim().is_empty() {
                errors.push(StructuralValidationError::MissingOutputFormat);
            }
        }
        if config.execution.parallelism == Some(0) {
            errors.push(StructuralValidationError::ZeroParallelism);
        }

        for (index, descriptor) in config.stages().enumerate() {
            if descriptor.type_name.trim().is_empty() {
                errors.push(StructuralValidationError::EmptyType { index });
            }
            if descriptor.category.is_connector() {
                errors.push(StructuralValidationError::ConnectorAsStage {
                    index,
                    category: descriptor.category,
                    type_name: descriptor.type_name.clone(),
                });
            }
        }

        for (index, descriptor) in config.aggregations.iter().enumerate() {
            if descriptor.category != ComponentCategory::Aggregation {
                errors.push(StructuralValidationError::NonAggregationInAggregations {
                    index,
                    category: descriptor.category,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
