//! CLI command definitions for stackgen
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod deploy;

use clap::{Parser, Subcommand};
use deploy::DeployArgs;

/// Deployment file generator for docker-compose stacks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate deployment files from the stack configuration
    Deploy(DeployArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_defaults() {
        let cli = Cli::try_parse_from(["stackgen", "deploy"]).unwrap();
        assert_eq!(cli.log, "2");
        assert!(!cli.verbose);
        let Command::Deploy(args) = cli.command;
        assert_eq!(args.source_directory, ".");
        assert_eq!(args.target_directory, None);
        assert!(!args.overwrite);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["stackgen", "deploy", "-v", "--log", "off"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.log, "off");
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["stackgen"]).is_err());
    }
}
