//! Compiled execution plan.

use std::fmt::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use common_config::ExecutionConfig;
use strata_logical::{ComponentCategory, Params, StageKind};
use strata_storage::{Reader, Writer};

use crate::stages::Stage;

/// A resolved, instantiated stage.
#[derive(Debug, Clone)]
pub struct PlannedStage {
    /// Unique stage name.
    pub name: String,
    pub category: ComponentCategory,
    pub type_name: String,
    pub params: Params,
    pub stage: Stage,
}

impl PlannedStage {
    pub fn kind(&self) -> StageKind {
        self.stage.kind()
    }

    fn describe(&self) -> StageDescription {
        StageDescription {
            name: self.name.clone(),
            category: self.category,
            type_name: self.type_name.clone(),
            kind: self.kind(),
            params: params_json(&self.params),
        }
    }
}

/// The input connector of a plan.
#[derive(Debug, Clone)]
pub struct PlannedReader {
    pub format: String,
    pub params: Params,
    pub reader: Arc<dyn Reader>,
}

/// The output connector of a plan.
#[derive(Debug, Clone)]
pub struct PlannedWriter {
    pub format: String,
    pub params: Params,
    pub writer: Arc<dyn Writer>,
}

/// An immutable, executable pipeline.
///
/// Produced once per run by the compiler and shared read-only (behind an
/// `Arc`) by every worker.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    name: String,
    reader: PlannedReader,
    stages: Vec<PlannedStage>,
    writer: Option<PlannedWriter>,
    execution: ExecutionConfig,
}

impl ExecutionPlan {
    pub(crate) fn new(
        name: String,
        reader: PlannedReader,
        stages: Vec<PlannedStage>,
        writer: Option<PlannedWriter>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            name,
            reader,
            stages,
            writer,
            execution,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reader(&self) -> &PlannedReader {
        &self.reader
    }

    pub fn stages(&self) -> &[PlannedStage] {
        &self.stages
    }

    pub fn writer(&self) -> Option<&PlannedWriter> {
        self.writer.as_ref()
    }

    pub fn execution(&self) -> &ExecutionConfig {
        &self.execution
    }

    /// Replace the input with an already constructed reader.
    #[must_use]
    pub fn with_reader(mut self, format: impl Into<String>, reader: Arc<dyn Reader>) -> Self {
        self.reader = PlannedReader {
            format: format.into(),
            params: Params::default(),
            reader,
        };
        self
    }

    /// Replace the output with an already constructed writer.
    #[must_use]
    pub fn with_writer(mut self, format: impl Into<String>, writer: Arc<dyn Writer>) -> Self {
        self.writer = Some(PlannedWriter {
            format: format.into(),
            params: Params::default(),
            writer,
        });
        self
    }

    /// Override the execution settings.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Aggregate stages in plan order.
    pub fn aggregate_stages(&self) -> impl Iterator<Item = &PlannedStage> {
        self.stages
            .iter()
            .filter(|s| s.kind() == StageKind::Aggregate)
    }

    /// Serializable summary of the plan.
    pub fn describe(&self) -> PlanDescription {
        PlanDescription {
            name: self.name.clone(),
            input: ConnectorDescription {
                format: self.reader.format.clone(),
                params: params_json(&self.reader.params),
            },
            stages: self.stages.iter().map(PlannedStage::describe).collect(),
            output: self.writer.as_ref().map(|w| ConnectorDescription {
                format: w.format.clone(),
                params: params_json(&w.params),
            }),
            execution: self.execution.clone(),
        }
    }

    /// Generate EXPLAIN output.
    pub fn explain(&self) -> String {
        let mut output = format!("Execution Plan: {}\n", self.name);
        let _ = writeln!(
            output,
            "  Input: {} {}",
            self.reader.format,
            params_json(&self.reader.params)
        );
        for (i, stage) in self.stages.iter().enumerate() {
            let _ = writeln!(
                output,
                "  [{i}] {} ({}, {}.{}) {}",
                stage.name,
                stage.kind(),
                stage.category,
                stage.type_name,
                params_json(&stage.params)
            );
        }
        match &self.writer {
            Some(w) => {
                let _ = writeln!(output, "  Output: {} {}", w.format, params_json(&w.params));
            }
            None => output.push_str("  Output: (discarded)\n"),
        }
        let _ = writeln!(
            output,
            "  Execution: parallelism={}, on_stage_error={}, preserve_order={}",
            self.execution.effective_parallelism(),
            self.execution.on_stage_error,
            self.execution.preserve_order
        );
        output
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.explain())
    }
}

fn params_json(params: &Params) -> serde_json::Value {
    serde_json::Value::Object(
        params
            .values()
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect(),
    )
}

/// Serializable description of a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDescription {
    pub format: String,
    pub params: serde_json::Value,
}

/// Serializable description of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescription {
    pub name: String,
    pub category: ComponentCategory,
    #[serde(rename = "type")]
    pub type_name: String,
    pub kind: StageKind,
    pub params: serde_json::Value,
}

/// Serializable description of a compiled plan.
///
/// Two compilations of the same description against the same registry yield
/// equal `PlanDescription`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDescription {
    pub name: String,
    pub input: ConnectorDescription,
    pub stages: Vec<StageDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ConnectorDescription>,
    pub execution: ExecutionConfig,
}
