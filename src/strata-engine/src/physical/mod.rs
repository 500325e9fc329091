//! Physical plan model.

mod plan;

pub use plan::{
    ConnectorDescription, ExecutionPlan, PlanDescription, PlannedReader, PlannedStage,
    PlannedWriter, StageDescription,
};
