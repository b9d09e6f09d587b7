//! Starchart CLI - Command-line interface
//!
//! Drives the starchart library from a terminal: sync the remote catalogue
//! into the local store, look systems up, run range queries over the cache,
//! and manage configuration.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use starchart::config::ConfigFile;
use starchart::geometry::Rect;
use starchart::logging::{init_logging, LoggingGuard};

mod commands;
mod error;

use commands::cache::CacheAction;
use commands::common::GlobalOptions;
use commands::config::ConfigCommands;
use commands::sync::SyncArgs;
use error::CliError;

/// Starchart - spatial cache for the remote star-system catalogue
#[derive(Debug, Parser)]
#[command(name = "starchart")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Keep the store in memory for this run
    #[arg(long, global = true)]
    no_persist: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Page the remote catalogue into the local store
    Sync(SyncArgs),

    /// Show one system, fetching it if it is not cached
    Get {
        /// System identifier (e.g., X1-DF55)
        id: String,
    },

    /// List cached systems inside a world rectangle
    Query {
        #[arg(allow_negative_numbers = true)]
        min_x: f64,
        #[arg(allow_negative_numbers = true)]
        min_y: f64,
        #[arg(allow_negative_numbers = true)]
        max_x: f64,
        #[arg(allow_negative_numbers = true)]
        max_y: f64,
    },

    /// Manage the local store
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn setup_logging(verbose: bool) -> Result<LoggingGuard, CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    let filter = if verbose { Some("starchart=debug") } else { None };
    Ok(init_logging(config.logging.file.as_deref(), filter)?)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let options = GlobalOptions {
        no_persist: cli.no_persist,
    };

    match cli.command {
        Commands::Sync(args) => commands::sync::run(args, options),
        Commands::Get { id } => commands::get::run(&id, options),
        Commands::Query {
            min_x,
            min_y,
            max_x,
            max_y,
        } => commands::query::run(Rect::new(min_x, min_y, max_x, max_y), options),
        Commands::Cache { action } => commands::cache::run(action),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            return ExitCode::from(e.exit_code());
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_with_limit() {
        let cli = Cli::try_parse_from(["starchart", "sync", "--pages", "3", "--reset"]).unwrap();
        match cli.command {
            Commands::Sync(args) => {
                assert_eq!(args.pages, Some(3));
                assert!(args.reset);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_query_with_negative_bounds() {
        let cli =
            Cli::try_parse_from(["starchart", "query", "-100", "-50.5", "100", "50"]).unwrap();
        match cli.command {
            Commands::Query {
                min_x,
                min_y,
                max_x,
                max_y,
            } => assert_eq!((min_x, min_y, max_x, max_y), (-100.0, -50.5, 100.0, 50.0)),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_no_persist_after_subcommand() {
        let cli = Cli::try_parse_from(["starchart", "get", "X1-DF55", "--no-persist"]).unwrap();
        assert!(cli.no_persist);
    }

    #[test]
    fn test_config_requires_subcommand() {
        assert!(Cli::try_parse_from(["starchart", "config"]).is_err());
    }
}
