use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use common_config::StageErrorPolicy;
use strata_logical::ComponentCategory;

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "strata",
    version,
    about = "Declarative text-corpus preprocessing pipelines"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile and run a pipeline description.
    Run(RunArgs),
    /// List registered components.
    List(ListArgs),
    /// Compile a pipeline description without running it.
    Validate(ValidateArgs),
    /// Print the JSON-Schema of every component's parameters.
    ExportSchemas(ExportSchemasArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline description (YAML, or JSON with a `.json` extension).
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
    /// Override the input path.
    #[arg(long, value_name = "PATH")]
    pub input: Option<String>,
    /// Override the output path. Adds a `jsonl` writer if the pipeline has none.
    #[arg(long, value_name = "PATH")]
    pub output: Option<String>,
    /// Number of partitions processed concurrently.
    #[arg(long)]
    pub parallelism: Option<usize>,
    /// Record failure policy (`abort` or `skip_record`).
    #[arg(long, value_name = "POLICY")]
    pub on_stage_error: Option<StageErrorPolicy>,
    /// Write partitions in input order.
    #[arg(long)]
    pub preserve_order: bool,
    /// Print the run summary as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only list one category.
    #[arg(long)]
    pub category: Option<ComponentCategory>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct ExportSchemasArgs {
    /// Only export one category.
    #[arg(long)]
    pub category: Option<ComponentCategory>,
    /// Write to a file instead of stdout.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}
