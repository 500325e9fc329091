//! Strata - declarative, plugin-extensible text-corpus preprocessing
//!
//! A pipeline description names a reader, an ordered list of taggers,
//! filters, formatters, extractors and aggregations, and a writer. The
//! compiler resolves every component through a [`engine::Registry`] and the
//! executor runs the resulting plan over partitions in parallel.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use strata::engine::{Compiler, LocalExecutor};
//! use strata::logical::PipelineConfig;
//!
//! # fn main() -> strata::error::StrataResult<()> {
//! let config = PipelineConfig::from_path("pipeline.yaml")?;
//! let plan = Compiler::compile(&config, strata::processors::default_registry())?;
//! let summary = LocalExecutor::new().run_sync(Arc::new(plan))?;
//! println!("{}", summary.explain_analyze());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use strata_core as core;
pub use strata_engine as engine;
pub use strata_logical as logical;
pub use strata_processors as processors;
pub use strata_storage as storage;

/// Strata version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
