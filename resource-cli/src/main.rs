use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use resource_engine::catalog::{
    Catalog, CatalogSeed, Collection, Episode, LibraryItem, Season, Show, Studio,
};
use resource_engine::config::{Config, CONFIG_FILE};
use resource_engine::observability::init_tracing;

mod commands;

use commands::{Action, ListArgs};

/// resq - query a resource catalog from the command line
#[derive(Parser)]
#[command(name = "resq")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// JSON seed file loaded into the in-memory catalog
    #[arg(long, env = "RESQ_SEED", value_name = "FILE")]
    seed: PathBuf,

    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Production studios
    Studios {
        #[command(subcommand)]
        action: Action,
    },
    /// Shows
    Shows {
        #[command(subcommand)]
        action: Action,
    },
    /// Seasons
    Seasons {
        #[command(subcommand)]
        action: Action,
    },
    /// Episodes
    Episodes {
        #[command(subcommand)]
        action: Action,
    },
    /// Collections
    Collections {
        #[command(subcommand)]
        action: Action,
    },
    /// Shows and collections listed together (read-only)
    Library {
        #[command(subcommand)]
        action: Action,
    },
    /// Episodes of one show
    EpisodesOf {
        /// Id or slug of the show
        #[arg(value_name = "SHOW")]
        show: String,

        #[command(flatten)]
        list: ListArgs,
    },
}

async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    init_tracing(&config)?;

    let seed = CatalogSeed::read(&cli.seed)
        .await
        .with_context(|| format!("Failed to read seed file: {}", cli.seed.display()))?;
    let catalog = Catalog::in_memory(&config);
    let summary = catalog.load_seed(seed).await.context("Failed to load seed")?;
    tracing::debug!(seed = %cli.seed.display(), ?summary, "Catalog ready");

    let output = match cli.command {
        Commands::Studios { action } => {
            commands::run::<Studio, _>(&catalog, &catalog.studios, action).await?
        }
        Commands::Shows { action } => {
            commands::run::<Show, _>(&catalog, &catalog.shows, action).await?
        }
        Commands::Seasons { action } => {
            commands::run::<Season, _>(&catalog, &catalog.seasons, action).await?
        }
        Commands::Episodes { action } => {
            commands::run::<Episode, _>(&catalog, &catalog.episodes, action).await?
        }
        Commands::Collections { action } => {
            commands::run::<Collection, _>(&catalog, &catalog.collections, action).await?
        }
        Commands::Library { action } => {
            commands::run::<LibraryItem, _>(&catalog, &catalog.library, action).await?
        }
        Commands::EpisodesOf { show, list } => {
            commands::episodes_of(&catalog, &show, &list).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Handle result
    match execute(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);

            // Show context if available
            for cause in e.chain().skip(1) {
                eprintln!("\n{} {}", "Caused by:".yellow(), cause);
            }

            std::process::exit(1);
        }
    }
}
