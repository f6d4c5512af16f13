mod classify;
mod cli;
mod commands;
mod config;
mod error;
mod loader;
mod model;
mod normalize;
mod sheet;
mod table;
mod template;
#[cfg(test)]
mod test_support;
mod unify;
mod util;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Log filter read before `RUST_LOG`, so sheetload's verbosity can be raised
/// without turning on every dependency's logs.
const LOG_ENV: &str = "SHEETLOAD_LOG";

fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    debug!(version = env!("CARGO_PKG_VERSION"), "sheetload starting");
    match cli.command {
        Commands::Inventory(args) => commands::inventory::run(args),
        Commands::Ingest(args) => commands::ingest::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
