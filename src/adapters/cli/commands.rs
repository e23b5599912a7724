//! CLI Commands
//!
//! Argument definitions for the listing sniper.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Listing Sniper - buys new launchpad tax tokens on BNB Smart Chain
#[derive(Parser, Debug)]
#[command(
    name = "listing-sniper",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Launchpad listing sniper for BNB Smart Chain",
    long_about = "Listens for LiquidityAdded events on the launchpad, buys every new tax token \
                  from all configured wallets and manages stop-loss / take-profit exits."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for listings and trade
    Run(RunCmd),

    /// Show configured wallets and their balances
    Status(StatusCmd),

    /// Show positions from the last snapshot
    Positions(PositionsCmd),
}

impl Command {
    /// Configuration file the command reads
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Run(cmd) => &cmd.config,
            Command::Status(cmd) => &cmd.config,
            Command::Positions(cmd) => &cmd.config,
        }
    }
}

/// Start the sniper
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sniper.toml")]
    pub config: PathBuf,

    /// Sign transactions but never broadcast them
    #[arg(long)]
    pub dry_run: bool,
}

/// Check wallet status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sniper.toml")]
    pub config: PathBuf,
}

/// Inspect snapshotted positions
#[derive(Parser, Debug)]
pub struct PositionsCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/sniper.toml")]
    pub config: PathBuf,

    /// Print the raw snapshot as JSON
    #[arg(long)]
    pub json: bool,
}
