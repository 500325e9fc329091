//! Declarative layer for Strata pipelines.
//!
//! This crate describes *what* a pipeline does, independent of how it runs:
//! - [`PipelineConfig`] and [`ComponentDescriptor`] as loaded from YAML/JSON
//! - [`ParamSchema`] declarations and validated [`Params`]
//! - Structural and schema-flow [`validation`]

pub mod params;
pub mod pipeline;
pub mod validation;

pub use params::{Constraint, ParamSchema, ParamSpec, ParamType, Params};
pub use pipeline::{
    ComponentCategory, ComponentDescriptor, ConnectorConfig, PipelineConfig, StageKind,
};
pub use validation::{validate_structure, SchemaFlowValidator, StageFields, StructuralValidator};
