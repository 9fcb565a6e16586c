mod cli;
mod config;
mod models;
mod services;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::League;
use crate::services::LastSeenPolicy;

#[derive(Parser)]
#[command(name = "reftrends")]
#[command(about = "Per-official and per-crew officiating trends from completed games")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one aggregation pass and write the trend report
    Build(BuildArgs),
    /// List supported leagues and where their events are read from
    Leagues,
}

#[derive(Args, Default)]
struct BuildArgs {
    /// Directory holding per-league event dumps
    #[arg(long)]
    events_dir: Option<PathBuf>,
    /// HTTP feed base URL (or template with {league}); overrides --events-dir
    #[arg(long)]
    feed_url: Option<String>,
    /// Directory of odds snapshot documents
    #[arg(long)]
    odds_dir: Option<PathBuf>,
    /// Report output path
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Also write officials.csv and crews.csv here
    #[arg(long)]
    csv_dir: Option<PathBuf>,
    /// Leagues to process, in order
    #[arg(short, long, value_delimiter = ',')]
    leagues: Option<Vec<League>>,
    /// Freeform notes stored in the report
    #[arg(long)]
    notes: Option<String>,
    /// Source label stored in the report
    #[arg(long)]
    source_label: Option<String>,
    /// How lastSeen is updated
    #[arg(long, value_enum)]
    last_seen: Option<LastSeenPolicy>,
}

impl BuildArgs {
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.events_dir {
            config.events_dir = dir;
        }
        if let Some(url) = self.feed_url {
            config.feed_url = Some(url);
        }
        if let Some(dir) = self.odds_dir {
            config.odds_dir = dir;
        }
        if let Some(path) = self.output {
            config.output = path;
        }
        if let Some(dir) = self.csv_dir {
            config.csv_dir = Some(dir);
        }
        if let Some(leagues) = self.leagues {
            config.leagues = leagues;
        }
        if let Some(notes) = self.notes {
            config.notes = Some(notes);
        }
        if let Some(label) = self.source_label {
            config.source_label = Some(label);
        }
        if let Some(policy) = self.last_seen {
            config.last_seen = policy;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Some(Commands::Build(args)) => {
            args.apply(&mut config);
            tracing::info!("Building trends for {} leagues", config.leagues.len());
            cli::build_trends(&config).await?;
        }
        Some(Commands::Leagues) => {
            cli::show_leagues(&config);
        }
        None => {
            // Default to a full build
            tracing::info!("Building trends for {} leagues", config.leagues.len());
            cli::build_trends(&config).await?;
        }
    }

    Ok(())
}
