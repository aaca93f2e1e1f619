//! Load sentinel CLI
//!
//! A command-line tool for querying monitored entities, pushing sample
//! files to the agent and analyzing recorded series offline.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{analyze, discords, entities, push};
use sentinel_lib::anomaly::{DEFAULT_THRESHOLD_K, DEFAULT_TRAILING_WINDOW};
use sentinel_lib::monitor::DEFAULT_WINDOW_SIZE;
use std::path::PathBuf;

/// Load sentinel CLI
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author, version, about = "CLI for Load Sentinel", long_about = None)]
pub struct Cli {
    /// Agent endpoint URL (can also be set via SENTINEL_API_URL env var)
    #[arg(long, env = "SENTINEL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List monitored entities
    Entities,

    /// Show the state of an entity
    Status {
        /// Entity id (e.g. host1/cpu)
        entity: String,
    },

    /// Show the most unusual subsequences of an entity
    Discords {
        /// Entity id
        entity: String,

        /// Number of discords to return
        #[arg(short, default_value_t = 3)]
        k: usize,
    },

    /// Push rows from a JSON file to an entity
    Push {
        /// Entity id
        entity: String,

        /// JSON array of {"timestamp": ..., "values": {...}} rows
        #[arg(long)]
        file: PathBuf,
    },

    /// Analyze a rows file offline, without contacting the agent
    Analyze {
        /// JSON array of {"timestamp": ..., "values": {...}} rows
        #[arg(long)]
        file: PathBuf,

        /// Subsequence length
        #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window: usize,

        /// Number of discords to return
        #[arg(short, default_value_t = 3)]
        k: usize,

        /// Profile entries used to score the newest subsequence
        #[arg(long, default_value_t = DEFAULT_TRAILING_WINDOW)]
        trailing_window: usize,

        /// Standard deviations above the trailing mean that count as anomalous
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_K)]
        threshold_k: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let connect = || client::ApiClient::new(&cli.api_url);

    match cli.command {
        Commands::Entities => entities::list_entities(&connect()?, cli.format).await?,
        Commands::Status { entity } => {
            entities::show_status(&connect()?, &entity, cli.format).await?
        }
        Commands::Discords { entity, k } => {
            discords::show_discords(&connect()?, &entity, k, cli.format).await?
        }
        Commands::Push { entity, file } => {
            push::push_rows(&connect()?, &entity, &file, cli.format).await?
        }
        Commands::Analyze {
            file,
            window,
            k,
            trailing_window,
            threshold_k,
        } => {
            let options = analyze::AnalyzeOptions {
                window,
                k,
                trailing_window,
                threshold_k,
            };
            analyze::analyze_file(&file, options, cli.format)?
        }
    }

    Ok(())
}
