//! Pipeline compiler.
//!
//! Turns a [`PipelineConfig`] into an [`ExecutionPlan`] by resolving every
//! descriptor through a [`Registry`]:
//!
//! 1. Structural validation (names, formats, connector placement)
//! 2. Input reader resolution and parameter validation
//! 3. Stage resolution, parameter validation and instantiation
//! 4. Output writer resolution
//! 5. Field-flow validation against the reader's declared schema
//!
//! Compilation touches no data and is deterministic: compiling the same
//! description against the same registry yields equal plan descriptions.

use std::collections::BTreeSet;

use common_error::{StrataError, StrataResult};
use strata_logical::{
    validate_structure, ComponentCategory, ConnectorConfig, PipelineConfig, SchemaFlowValidator,
    StageFields,
};

use crate::physical::{ExecutionPlan, PlannedReader, PlannedStage, PlannedWriter};
use crate::registry::{ComponentEntry, Registry};

/// Compiles pipeline descriptions into execution plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct Compiler;

impl Compiler {
    /// Compile a pipeline description.
    pub fn compile(config: &PipelineConfig, registry: &Registry) -> StrataResult<ExecutionPlan> {
        validate_structure(config)?;

        let input = resolve_connector(registry, ComponentCategory::Reader, &config.input)?;
        let reader_params = input.validate(&config.input.resolved_params())?;
        let reader = PlannedReader {
            format: config.input.format.clone(),
            reader: input.build_reader(&reader_params)?,
            params: reader_params,
        };

        let mut names = BTreeSet::new();
        let mut stages = Vec::new();
        for descriptor in config.stages() {
            let entry = registry.resolve(descriptor.category, &descriptor.type_name)?;
            let params = entry.validate(&descriptor.params)?;
            if !descriptor.enabled {
                log::debug!("stage {} is disabled; skipping", descriptor.qualified_type());
                continue;
            }
            let stage = entry.build_stage(&params)?;

            let base = descriptor
                .name
                .clone()
                .or_else(|| {
                    stage
                        .as_aggregate()
                        .and_then(|agg| agg.result_name())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| descriptor.qualified_type());
            let name = unique_name(&mut names, base);

            stages.push(PlannedStage {
                name,
                category: descriptor.category,
                type_name: descriptor.type_name.clone(),
                params,
                stage,
            });
        }

        let writer = match &config.output {
            Some(output) => {
                let entry = resolve_connector(registry, ComponentCategory::Writer, output)?;
                let params = entry.validate(&output.resolved_params())?;
                Some(PlannedWriter {
                    format: output.format.clone(),
                    writer: entry.build_writer(&params)?,
                    params,
                })
            }
            None => None,
        };

        let fields: Vec<StageFields> = stages
            .iter()
            .map(|s| StageFields {
                name: s.name.clone(),
                category: s.category,
                consumes: s.stage.consumes(),
                produces: s.stage.produces(),
            })
            .collect();
        if let Err(errors) = SchemaFlowValidator::validate(&reader.reader.schema(), &fields) {
            let first = errors
                .into_iter()
                .next()
                .ok_or_else(|| StrataError::internal("validator returned no errors"))?;
            return Err(first.into());
        }

        log::debug!(
            "compiled pipeline '{}': {} stage(s), input={}, output={}",
            config.name,
            stages.len(),
            reader.format,
            writer.as_ref().map_or("none", |w| w.format.as_str())
        );

        Ok(ExecutionPlan::new(
            config.name.clone(),
            reader,
            stages,
            writer,
            config.execution.clone(),
        ))
    }
}

/// Resolve a connector, reporting a connector of the wrong direction as a
/// placement error.
fn resolve_connector<'r>(
    registry: &'r Registry,
    category: ComponentCategory,
    connector: &ConnectorConfig,
) -> StrataResult<&'r ComponentEntry> {
    let opposite = match category {
        ComponentCategory::Reader => ComponentCategory::Writer,
        _ => ComponentCategory::Reader,
    };
    match registry.resolve(category, &connector.format) {
        Ok(entry) => Ok(entry),
        Err(_) if registry.contains(opposite, &connector.format) => Err(StrataError::stage_order(
            format!("{opposite}.{}", connector.format),
            format!("a {opposite} cannot be used where a {category} is expected"),
        )),
        Err(e) => Err(e),
    }
}

/// `base`, or `base#n` with the smallest free `n >= 2`.
fn unique_name(taken: &mut BTreeSet<String>, base: String) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}#{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
