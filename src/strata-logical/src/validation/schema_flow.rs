//! Field-flow validation across the stage sequence.
//!
//! Readers declare the fields they guarantee; stages declare the fields they
//! consume and produce. Walking the stages in order with an evolving set of
//! known fields catches stages placed before their inputs exist. Anything
//! that cannot be decided statically is left to runtime.

use std::collections::BTreeSet;

use strata_core::schema::{is_descendant, paths_overlap};
use strata_core::SourceSchema;

use crate::pipeline::ComponentCategory;

/// Declared field usage of one planned stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFields {
    /// Unique stage name.
    pub name: String,
    /// Stage category.
    pub category: ComponentCategory,
    /// Field paths the stage reads.
    pub consumes: Vec<String>,
    /// Field paths the stage writes.
    pub produces: Vec<String>,
}

/// A field-flow violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaFlowError {
    /// A stage reads a field that only a later stage writes.
    ProducedLater {
        stage: String,
        field: String,
        producer: String,
    },
    /// A stage reads a field a closed source schema cannot contain.
    MissingField { stage: String, field: String },
    /// A tagger writes a field that already exists.
    TaggerOverwrite { stage: String, field: String },
}

impl SchemaFlowError {
    /// Stage the error is reported against.
    pub fn stage(&self) -> &str {
        match self {
            Self::ProducedLater { stage, .. }
            | Self::MissingField { stage, .. }
            | Self::TaggerOverwrite { stage, .. } => stage,
        }
    }
}

impl std::fmt::Display for SchemaFlowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProducedLater {
                field, producer, ..
            } => write!(
                f,
                "reads '{field}', which is only produced by the later stage '{producer}'"
            ),
            Self::MissingField { field, .. } => write!(
                f,
                "reads '{field}', which is neither in the input schema nor produced by an earlier stage"
            ),
            Self::TaggerOverwrite { field, .. } => write!(
                f,
                "tags '{field}', which already exists; taggers may only add fields"
            ),
        }
    }
}

impl std::error::Error for SchemaFlowError {}

/// Validator for field flow through the stage sequence.
pub struct SchemaFlowValidator;

impl SchemaFlowValidator {
    /// Walk the stages in order against the source schema.
    pub fn validate(
        source: &SourceSchema,
        stages: &[StageFields],
    ) -> Result<(), Vec<SchemaFlowError>> {
        let mut errors = Vec::new();
        let mut known: BTreeSet<String> = source.fields.clone();

        for (position, stage) in stages.iter().enumerate() {
            for field in &stage.consumes {
                if known.iter().any(|k| paths_overlap(k, field)) {
                    continue;
                }
                let later = stages[position + 1..].iter().find(|s| {
                    s.produces
                        .iter()
                        .any(|p| p == field || is_descendant(field, p))
                });
                if let Some(producer) = later {
                    errors.push(SchemaFlowError::ProducedLater {
                        stage: stage.name.clone(),
                        field: field.clone(),
                        producer: producer.name.clone(),
                    });
                } else if source.closed {
                    errors.push(SchemaFlowError::MissingField {
                        stage: stage.name.clone(),
                        field: field.clone(),
                    });
                }
            }

            for field in &stage.produces {
                let exists = known
                    .iter()
                    .any(|k| k == field || is_descendant(k, field));
                if stage.category == ComponentCategory::Tagger && exists {
                    errors.push(SchemaFlowError::TaggerOverwrite {
                        stage: stage.name.clone(),
                        field: field.clone(),
                    });
                }
                known.insert(field.clone());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
