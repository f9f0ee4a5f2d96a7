//! fitsync CLI - Command-line interface for the offline cache
//!
//! Provides commands for:
//! - Draining the mutation queue against the remote store
//! - Viewing connectivity, pending mutations and cached record counts
//! - Inspecting queued mutations and cached records
//! - Viewing, editing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fitsync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, queue::QueueCommand, records::RecordsCommand, status::StatusCommand,
    sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "fitsync", version, about = "Offline cache and sync for the trainer app")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Drain queued mutations to the remote store
    Sync(SyncCommand),
    /// Show connectivity and pending work
    Status(StatusCommand),
    /// List queued mutations
    Queue(QueueCommand),
    /// List cached records of a collection
    Records(RecordsCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    async fn run(self) -> Result<()> {
        let format = OutputFormat::from_flag(self.json);
        let config_path = self.config.unwrap_or_else(Config::default_path);

        match self.command {
            Commands::Sync(cmd) => cmd.execute(format, &config_path).await,
            Commands::Status(cmd) => cmd.execute(format, &config_path).await,
            Commands::Queue(cmd) => cmd.execute(format, &config_path).await,
            Commands::Records(cmd) => cmd.execute(format, &config_path).await,
            Commands::Config(cmd) => cmd.execute(format, &config_path).await,
        }
    }
}

/// Diagnostics go to stderr so `--json` output stays parseable
fn init_tracing(verbose: u8) {
    let default_level = ["warn", "info", "debug"]
        .get(usize::from(verbose))
        .copied()
        .unwrap_or("trace");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.run().await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["fitsync", "status", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Status(_)));
    }
}
