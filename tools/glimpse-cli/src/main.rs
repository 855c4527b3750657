//! Glimpse CLI: pick a screen or window and record it.
//!
//! Usage:
//!   glimpse sources            List capturable screens and windows
//!   glimpse record [OPTIONS]   Record a source to WebM/MP4/3GPP and/or GIF
//!   glimpse check              Check system capabilities
//!   glimpse config [--write]   Show or write the configuration

use clap::{Parser, Subcommand};

mod commands;
mod preview;

#[derive(Parser)]
#[command(
    name = "glimpse",
    about = "Screen and window recorder with video and GIF output",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List capturable sources
    Sources {
        /// Take a thumbnail of every source
        #[arg(long)]
        thumbnails: bool,

        /// Include the synthetic test pattern
        #[arg(long)]
        test_source: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Record a source
    Record(commands::record::RecordArgs),

    /// Check system capabilities
    Check,

    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = glimpse_common::config::AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    glimpse_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Sources {
            thumbnails,
            test_source,
            json,
        } => commands::sources::run(thumbnails, test_source, json).await,
        Commands::Record(args) => commands::record::run(config, args).await,
        Commands::Check => commands::check::run().await,
        Commands::Config { write } => commands::config::run(&config, write),
    }
}

