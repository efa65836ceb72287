//! CLI interface for reward-maker
//!
//! Provides subcommands for:
//! - `run`: Start the orchestrator (paper unless `--live`)
//! - `select`: One selection cycle, print the ranked targets
//! - `quote`: One-shot paper quote of a single market
//! - `discover`: Discovery smoke test
//! - `status`: Show persisted state
//! - `config`: Show configuration

mod discover;
mod quote;
mod run;
mod select;
mod status;

pub use discover::DiscoverArgs;
pub use quote::QuoteArgs;
pub use run::RunArgs;
pub use select::SelectArgs;
pub use status::show_status;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "reward-maker")]
#[command(about = "Low-churn two-sided quoting bot for Polymarket liquidity rewards")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start quoting the selected markets
    Run(RunArgs),
    /// Run one selection cycle
    Select(SelectArgs),
    /// Quote a single market once without placing orders
    Quote(QuoteArgs),
    /// Fetch a few markets from discovery
    Discover(DiscoverArgs),
    /// Show persisted state
    Status,
    /// Show configuration
    Config,
}
