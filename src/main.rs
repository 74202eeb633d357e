//! stackgen: generate docker-compose deployment files from a stack configuration.

use clap::Parser;
use stackgen::cli::{Cli, Command, deploy};
use std::process::ExitCode;

/// Exit status for any failed command.
const EXIT_FAILURE: u8 = 64;

fn run(cli: &Cli) -> anyhow::Result<()> {
    stackgen::logging::init(&cli.log, cli.verbose)?;
    match &cli.command {
        Command::Deploy(args) => deploy::run_deploy(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
