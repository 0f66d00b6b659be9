use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use league_stats::config::AppConfig;
use league_stats::models::{MatchId, Side};
use league_stats::pipeline::{Pipeline, RunMode};
use league_stats::ranking::EloRanking;
use league_stats::source::MemorySource;
use league_stats::storage::{DocumentKey, JsonStore};

#[derive(Parser)]
#[command(name = "league-stats")]
#[command(about = "Per-round match statistics with incremental player history")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: String,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate matches and write league, match and player documents
    Generate {
        /// Only process the listed matches and merge into existing player documents
        #[arg(long, short = 'i')]
        increment: bool,

        /// Match ids for an incremental run
        match_ids: Vec<u64>,
    },

    /// Print the statistic columns of each side
    Columns,

    /// Print a stored document (e.g. "players/STEAM_1:0:1", "league/12", "league", "win_loss")
    Show {
        key: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(Some(Path::new(&cli.config)))
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = PathBuf::from(data_dir);
    }
    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting league-stats v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Generate {
            increment,
            match_ids,
        } => {
            let mode = if increment {
                if match_ids.is_empty() {
                    bail!("--increment needs at least one match id");
                }
                RunMode::Incremental(match_ids.into_iter().map(MatchId::new).collect())
            } else {
                if !match_ids.is_empty() {
                    bail!("Match ids are only accepted with --increment");
                }
                RunMode::Full
            };

            let source = MemorySource::from_jsonl(
                config.source.rounds_path.clone(),
                Some(config.source.outcomes_path.clone()),
            )
            .context("Failed to load raw round data")?;

            let mut pipeline = Pipeline::new(
                config.pipeline_config(),
                Arc::new(source),
                Box::new(EloRanking::new(config.ranking)),
            )?;

            let result = pipeline.run(mode).await?;

            println!("\n=== Generate Results ===");
            println!("Mode:             {:?}", result.mode);
            println!("Matches:          {}", result.matches_processed);
            println!("Players written:  {}", result.players_written);
            println!("Duration:         {:?}", result.duration);
            println!("Output:           {:?}", config.data_dir);
        }

        Commands::Columns => {
            for side in Side::ALL {
                println!("{} (rounds: {})", side, side.round_count_column());
                for column in side.columns() {
                    println!("  {:<16} {:?}", column.name(), column);
                }
            }
        }

        Commands::Show { key } => {
            let key: DocumentKey = key.parse()?;
            let store = JsonStore::new(config.storage_config());
            let document = store
                .read_value(&key)
                .with_context(|| format!("Failed to read {}", key))?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }

        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
