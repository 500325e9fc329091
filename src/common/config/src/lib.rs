//! Configuration management for Strata.
//!
//! Provides the run-level execution configuration shared by pipeline
//! descriptions, the executor and the CLI.

use serde::{Deserialize, Serialize};

/// Global Strata configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Execution configuration.
    pub execution: ExecutionConfig,
}

/// Execution configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Number of partitions processed concurrently. `None` uses the number
    /// of available cores.
    pub parallelism: Option<usize>,
    /// What to do when a stage fails on a single record.
    pub on_stage_error: StageErrorPolicy,
    /// Write partitions in reader order instead of completion order.
    pub preserve_order: bool,
    /// Maximum number of per-record errors kept in the run summary.
    pub max_error_reports: usize,
    /// Collect per-stage metrics.
    pub collect_metrics: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: None,
            on_stage_error: StageErrorPolicy::Abort,
            preserve_order: false,
            max_error_reports: 100,
            collect_metrics: true,
        }
    }
}

impl ExecutionConfig {
    /// Resolve the worker count, falling back to the host's parallelism.
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism
            .filter(|p| *p > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }
}

/// Failure policy for record-level stage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorPolicy {
    /// The first stage error terminates the run.
    #[default]
    Abort,
    /// The offending record is dropped and counted; the run continues.
    #[serde(alias = "skipRecord", alias = "skip")]
    SkipRecord,
}

impl StageErrorPolicy {
    /// Name as written in configuration files.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::SkipRecord => "skip_record",
        }
    }
}

impl std::fmt::Display for StageErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip_record" | "skipRecord" | "skip" => Ok(Self::SkipRecord),
            other => Err(format!(
                "unknown stage error policy '{other}' (expected abort or skip_record)"
            )),
        }
    }
}
