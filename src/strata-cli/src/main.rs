//! `strata` command-line tool.

mod cli;
mod commands;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use common_error::StrataResult;
use strata_processors::default_registry;

fn main() -> ExitCode {
    let cli = <Cli as clap::Parser>::parse();
    init_tracing(cli.verbose);

    match dispatch(&cli) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        eprintln!("warning: a global subscriber is already installed");
    }
}

fn dispatch(cli: &Cli) -> StrataResult<String> {
    let registry = default_registry();
    match &cli.command {
        Commands::Run(args) => commands::run(args, registry),
        Commands::List(args) => Ok(commands::list(args, registry)),
        Commands::Validate(args) => commands::validate(args, registry),
        Commands::ExportSchemas(args) => commands::export_schemas(args, registry),
    }
}
