//! rdb2rdf CLI library.
//!
//! Argument types, config merging and command handlers behind the `rdb2rdf`
//! binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;
pub mod output;

use cli::{Cli, Commands};
use config::ConfigFile;

/// Dispatch a parsed [`Cli`] to its command handler.
pub fn run(cli: Cli) -> error::CliResult<()> {
    let config = ConfigFile::discover(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run(args) => commands::run::run(args, &config, cli.verbose, cli.quiet),
        Commands::Status(args) => commands::status::run(args, &config),
        Commands::Check { mapping, namespace } => commands::check::run(
            mapping.as_deref(),
            namespace.as_deref(),
            &config,
            cli.quiet,
        ),
    }
}
