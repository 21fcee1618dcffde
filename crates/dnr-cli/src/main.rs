//! Donorflow CLI - consolidate donor data from many source systems

use clap::Parser;
use std::process::ExitCode as ProcessExit;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod context;

use cli::Cli;
use commands::common::{exit_code_for, ExitCode};
use commands::{ingest, materialize, pipeline, query, resolve, setup, status, transform, views};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ProcessExit {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match &cli.command {
        cli::Commands::Setup => setup::execute(&cli.global).await,
        cli::Commands::Ingest(args) => ingest::execute(args, &cli.global).await,
        cli::Commands::Transform(args) => transform::execute(args, &cli.global).await,
        cli::Commands::Resolve => resolve::execute(&cli.global).await,
        cli::Commands::Views(args) => views::execute(args, &cli.global).await,
        cli::Commands::Materialize(args) => materialize::execute(args, &cli.global).await,
        cli::Commands::Pipeline(args) => pipeline::execute(args, &cli.global).await,
        cli::Commands::Query(args) => query::execute(args, &cli.global).await,
        cli::Commands::Status(args) => status::execute(args, &cli.global).await,
    };

    match result {
        Ok(()) => ProcessExit::SUCCESS,
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(code) => ProcessExit::from(code.0 as u8),
            None => {
                eprintln!("Error: {err:#}");
                ProcessExit::from(exit_code_for(&err) as u8)
            }
        },
    }
}
