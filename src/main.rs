//! `reelscout` CLI - resolve playable stream links for movies and episodes

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cmd::config::ConfigAction;
use reelscout::{ContentDescriptor, ContentKind};

#[derive(Parser)]
#[command(name = "reelscout")]
#[command(about = "Resolve playable stream links for movies and TV episodes")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/reelscout/streaming.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve ranked stream links for a movie or episode
    Resolve {
        /// TMDB id of the movie or series
        #[arg(long)]
        tmdb_id: u64,

        /// Title as listed in the catalog
        #[arg(long)]
        title: String,

        /// Release (or first air) year
        #[arg(long)]
        year: Option<u16>,

        /// Season number (series only)
        #[arg(long, requires = "episode")]
        season: Option<u32>,

        /// Episode number (series only)
        #[arg(long, requires = "season")]
        episode: Option<u32>,

        /// Print links as JSON
        #[arg(long)]
        json: bool,
    },

    /// List providers and their configuration
    Providers {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or edit the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "reelscout=debug,warn"
    } else {
        "reelscout=info,warn"
    };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let store = cmd::open_store(cli.config.as_deref());

    match cli.command {
        Commands::Resolve {
            tmdb_id,
            title,
            year,
            season,
            episode,
            json,
        } => {
            let descriptor = ContentDescriptor {
                tmdb_id,
                imdb_id: None,
                title,
                year,
                kind: if season.is_some() {
                    ContentKind::Series
                } else {
                    ContentKind::Movie
                },
                season,
                episode,
            };
            cmd::resolve::cmd_resolve(store, &descriptor, json).await?;
        }
        Commands::Providers { json } => {
            cmd::providers::cmd_providers(&store, json).await?;
        }
        Commands::Config { action } => {
            cmd::config::cmd_config(&store, action).await?;
        }
    }

    Ok(())
}
