//! Compilation and execution engine for Strata pipelines.
//!
//! This crate turns a declarative [`PipelineConfig`](strata_logical::PipelineConfig)
//! into an [`ExecutionPlan`] and runs it over the partitions of a reader.

#![allow(clippy::missing_const_for_fn)] // Builder patterns often can't be const
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't always need must_use
#![allow(clippy::doc_markdown)] // Documentation backticks are sometimes unnecessary
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)] // Some casts are intentional
#![allow(clippy::large_enum_variant)] // Some enum variants are intentionally large
#![allow(clippy::uninlined_format_args)] // Format args are sometimes clearer inline
#![allow(clippy::significant_drop_tightening)] // Some temporaries with Drop must stay alive
#![allow(clippy::needless_pass_by_value)] // Some pass-by-value is intentional
#![allow(clippy::float_cmp)] // Sketch tests compare exact values
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ PipelineConfig  │ ──▶ │    Compiler      │ ──▶ │  LocalExecutor   │
//! │ (strata-logical)│     │   + Registry     │     │                  │
//! └─────────────────┘     └──────────────────┘     └──────────────────┘
//!                                │                         │
//!                                ▼                         ▼
//!                         ExecutionPlan              Writer + RunSummary
//! ```
//!
//! # Key Components
//!
//! ## Registry ([`registry`])
//!
//! Maps `(category, name)` to a factory and a parameter schema. Built-in
//! components and plugins register through the same calls.
//!
//! ## Stages ([`stages`])
//!
//! Every component compiles to one of three contracts:
//!
//! - **Map**: [`MapFn`] - one record in, zero or one record out
//! - **Filter**: [`FilterFn`] - keep or drop, record untouched
//! - **Aggregate**: [`AggregateFn`] - mergeable partial state, record passes through
//!
//! ## Aggregation ([`aggregate`])
//!
//! Exact and sketch-based reductions with an explicit
//! `Created -> Accumulating -> Merging -> Finalized` lifecycle.
//!
//! ## Execution ([`executor`])
//!
//! - Bounded parallelism with backpressure on the reader
//! - `abort` or `skip_record` on record-level failures
//! - Cooperative cancellation through [`CancellationHandle`]
//! - Writers commit only after a fully successful run
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_engine::{Compiler, LocalExecutor};
//!
//! let plan = Compiler::compile(&config, &registry)?;
//! let summary = LocalExecutor::new().run(Arc::new(plan)).await?;
//! println!("{}", summary.explain_analyze());
//! ```

pub mod aggregate;
pub mod executor;
pub mod metrics;
pub mod physical;
pub mod planner;
pub mod registry;
pub mod stages;

pub use aggregate::{
    merge_tree, register_aggregations, Accumulator, AccumulatorPhase, AccumulatorState,
    Aggregation, AggregationKind, HyperLogLog, QuantileSketch,
};
pub use executor::{
    AggregationResult, CancellationHandle, ExecutionContext, LocalExecutor, RunSummary,
    RuntimeConfig,
};
pub use metrics::{ExecutionTimer, MetricsSink, OperatorMetrics};
pub use physical::{ExecutionPlan, PlanDescription, PlannedStage};
pub use planner::Compiler;
pub use registry::{ComponentEntry, Factory, Registry};
pub use stages::{AggregateFn, FilterFn, MapFn, Stage};
