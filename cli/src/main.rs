//! Waypost CLI - inspect and exercise route tables without a UI
//!
//! # Commands
//! - `waypost check <config>` - Validate a route table
//! - `waypost recognize <config> <url>` - Print the route snapshot tree for a URL
//! - `waypost simulate <config> <url>...` - Run navigations against headless outlets

mod check;
mod config;
mod headless;
mod recognize;
mod simulate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Waypost CLI
#[derive(Parser)]
#[command(name = "waypost")]
#[command(author, version, about = "Inspect and exercise Waypost route tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a route table
    Check {
        /// Router configuration (TOML)
        config: PathBuf,
    },

    /// Print the route snapshot tree a URL resolves to
    Recognize {
        config: PathBuf,
        url: String,
    },

    /// Navigate to each URL in order against headless outlets
    Simulate {
        config: PathBuf,

        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { config } => check::run_check_command(&config),
        Commands::Recognize { config, url } => recognize::run_recognize_command(&config, &url).await,
        Commands::Simulate { config, urls } => simulate::run_simulate_command(&config, &urls).await,
    }
}
