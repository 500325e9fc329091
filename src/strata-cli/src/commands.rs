//! Subcommand implementations. Each returns the text to print on stdout.

use std::fmt::Write;
use std::sync::Arc;

use serde_json::json;

use common_error::{StrataError, StrataResult};
use strata_engine::{CancellationHandle, Compiler, LocalExecutor, Registry, RunSummary};
use strata_logical::{ConnectorConfig, PipelineConfig};

use crate::cli::{ExportSchemasArgs, ListArgs, RunArgs, ValidateArgs};

/// Apply command-line overrides to a loaded pipeline.
pub fn apply_overrides(config: &mut PipelineConfig, args: &RunArgs) {
    if let Some(input) = &args.input {
        config.input.path = Some(input.clone());
    }
    if let Some(output) = &args.output {
        match config.output.as_mut() {
            Some(connector) => connector.path = Some(output.clone()),
            None => config.output = Some(ConnectorConfig::new("jsonl").with_path(output.as_str())),
        }
    }
    if let Some(parallelism) = args.parallelism {
        config.execution.parallelism = Some(parallelism);
    }
    if let Some(policy) = args.on_stage_error {
        config.execution.on_stage_error = policy;
    }
    if args.preserve_order {
        config.execution.preserve_order = true;
    }
}

pub fn run(args: &RunArgs, registry: &Registry) -> StrataResult<String> {
    let mut config = PipelineConfig::from_path(&args.config)?;
    apply_overrides(&mut config, args);
    let plan = Arc::new(Compiler::compile(&config, registry)?);
    log::debug!("{}", plan.explain());

    let runtime = common_runtime::get_runtime()?;
    let summary = runtime.block_on(async {
        let cancel = CancellationHandle::new();
        let watcher = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received, cancelling run");
                watcher.cancel();
            }
        });
        LocalExecutor::new()
            .run_with_cancellation(plan, Some(cancel))
            .await
    })?;

    if args.json {
        serde_json::to_string_pretty(&summary_json(&summary)).map_err(StrataError::from)
    } else {
        Ok(summary.explain_analyze())
    }
}

fn summary_json(summary: &RunSummary) -> serde_json::Value {
    json!({
        "pipeline": summary.pipeline,
        "records_in": summary.records_in,
        "records_out": summary.records_out,
        "partitions": summary.partitions,
        "per_stage_drop_count": summary.per_stage_drop_count,
        "per_stage_skipped": summary.per_stage_skipped,
        "aggregations": summary.summary_records(),
        "error_count": summary.error_count,
        "errors": summary.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "elapsed_ms": summary.elapsed.as_millis() as u64,
    })
}

pub fn list(args: &ListArgs, registry: &Registry) -> String {
    let mut output = String::new();
    let mut current = None;
    for entry in registry.entries(args.category) {
        if current != Some(entry.category) {
            current = Some(entry.category);
            let _ = writeln!(output, "{}:", entry.category);
        }
        let _ = writeln!(output, "  {:<12} {}", entry.name, entry.description);
    }
    output
}

pub fn validate(args: &ValidateArgs, registry: &Registry) -> StrataResult<String> {
    let config = PipelineConfig::from_path(&args.config)?;
    let plan = Compiler::compile(&config, registry)?;
    Ok(format!("{} is valid\n\n{}", args.config.display(), plan.explain()))
}

pub fn export_schemas(args: &ExportSchemasArgs, registry: &Registry) -> StrataResult<String> {
    let body = serde_json::to_string_pretty(&registry.export_schemas(args.category))?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, body)
                .map_err(|e| StrataError::io(format!("cannot write {}: {e}", path.display())))?;
            Ok(format!("Wrote schemas to {}\n", path.display()))
        }
        None => Ok(body),
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use common_config::StageErrorPolicy;
    use strata_logical::ComponentCategory;
    use strata_processors::builtin_registry;

    use super::*;

    const PIPELINE: &str = r#"
name: cli-test
input:
  format: jsonl
  path: missing.jsonl
processors:
  - category: tagger
    type: length
aggregations:
  - category: aggregation
    type: sum
    params:
      on: metadata.length.word_count
"#;

    fn run_args(config: PathBuf) -> RunArgs {
        RunArgs {
            config,
            input: None,
            output: None,
            parallelism: None,
            on_stage_error: None,
            preserve_order: false,
            json: false,
        }
    }

    fn write_pipeline(dir: &Path) -> PathBuf {
        let path = dir.join("pipeline.yaml");
        std::fs::write(&path, PIPELINE).unwrap();
        path
    }

    #[test]
    fn test_overrides() {
        let mut config = PipelineConfig::from_yaml_str(PIPELINE).unwrap();
        let args = RunArgs {
            input: Some("data/in.jsonl".to_string()),
            output: Some("out.jsonl".to_string()),
            parallelism: Some(3),
            on_stage_error: Some(StageErrorPolicy::SkipRecord),
            preserve_order: true,
            ..run_args(PathBuf::from("unused.yaml"))
        };
        apply_overrides(&mut config, &args);

        assert_eq!(config.input.path.as_deref(), Some("data/in.jsonl"));
        let output = config.output.unwrap();
        assert_eq!(output.format, "jsonl");
        assert_eq!(output.path.as_deref(), Some("out.jsonl"));
        assert_eq!(config.execution.parallelism, Some(3));
        assert_eq!(config.execution.on_stage_error, StageErrorPolicy::SkipRecord);
        assert!(config.execution.preserve_order);
    }

    #[test]
    fn test_run_with_input_override() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_pipeline(dir.path());
        let input = dir.path().join("in.jsonl");
        std::fs::write(&input, "{\"text\": \"one two\"}\n{\"text\": \"three four five\"}\n").unwrap();
        let output = dir.path().join("out.jsonl");

        let args = RunArgs {
            input: Some(input.display().to_string()),
            output: Some(output.display().to_string()),
            json: true,
            ..run_args(config)
        };
        let printed = run(&args, &builtin_registry().unwrap()).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&printed).unwrap();

        assert_eq!(summary["records_out"], 2);
        assert_eq!(summary["aggregations"][0]["value"], 5);
        assert_eq!(std::fs::read_to_string(output).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_validate_reports_unknown_component() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, PIPELINE.replace("type: length", "type: lenght")).unwrap();

        let err = validate(&ValidateArgs { config: path }, &builtin_registry().unwrap()).unwrap_err();
        assert!(matches!(err, StrataError::ComponentNotFound { .. }));
    }

    #[test]
    fn test_validate_prints_plan() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_pipeline(dir.path());
        let text = validate(&ValidateArgs { config }, &builtin_registry().unwrap()).unwrap();
        assert!(text.contains("is valid"));
        assert!(text.contains("tagger.length"));
    }

    #[test]
    fn test_list_by_category() {
        let registry = builtin_registry().unwrap();
        let text = list(
            &ListArgs {
                category: Some(ComponentCategory::Writer),
            },
            &registry,
        );
        assert!(text.starts_with("writer:\n"));
        assert!(text.contains("  jsonl"));
        assert!(text.contains("  null"));
        assert!(!text.contains("tagger"));
    }

    #[test]
    fn test_export_schemas_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemas.json");
        let args = ExportSchemasArgs {
            category: Some(ComponentCategory::Tagger),
            output: Some(path.clone()),
        };
        export_schemas(&args, &builtin_registry().unwrap()).unwrap();

        let schemas: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let components = schemas["components"].as_object().unwrap();
        assert!(components.contains_key("strata://tagger/language"));
        assert!(components.keys().all(|k| k.starts_with("strata://tagger/")));
    }
}
