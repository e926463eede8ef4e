//! # reviewdesk CLI
//!
//! The `reviewdesk` binary serves the review API and dashboard, and offers
//! the same import/clear/report operations from the shell.
//!
//! ## Usage
//!
//! ```bash
//! reviewdesk --config ./config/reviewdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reviewdesk init` | Create the SQLite database and schema |
//! | `reviewdesk serve` | Start the HTTP server |
//! | `reviewdesk import <kind> <file>` | Import a CSV file into a record kind |
//! | `reviewdesk clear <kind>` | Delete every record of a kind |
//! | `reviewdesk stats` | Print summary stats and histograms |
//!
//! ## Examples
//!
//! ```bash
//! reviewdesk init
//! reviewdesk import software ./data/software.csv
//! reviewdesk stats
//! reviewdesk serve
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use reviewdesk::config::{self, Config};
use reviewdesk::models::RecordKind;
use reviewdesk::{ingest, logging, migrate, reports, server, store};

/// reviewdesk: review collections behind a small HTTP API.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/reviewdesk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "reviewdesk",
    about = "Import, browse and report on product reviews",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/reviewdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it on an existing database is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Import a CSV file, one record per data row.
    ///
    /// Same pipeline as `POST /upload-csv/{kind}`: all rows or none.
    Import {
        /// Record kind: `software`, `users`, `products` or `reviews`.
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,

        /// CSV file with a header row.
        file: PathBuf,
    },

    /// Delete every record of a kind.
    Clear {
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,
    },

    /// Print summary stats and the rating/year histograms.
    Stats,
}

fn parse_kind(raw: &str) -> Result<RecordKind, String> {
    RecordKind::from_name(raw).ok_or_else(|| {
        let known: Vec<&str> = RecordKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown record kind '{}' (expected one of: {})", raw, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Import { kind, file } => {
            ingest::run_import(&cfg, kind, &file).await?;
        }
        Commands::Clear { kind } => {
            run_clear(&cfg, kind).await?;
        }
        Commands::Stats => {
            reports::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_clear(cfg: &Config, kind: RecordKind) -> Result<()> {
    let store = store::open(cfg).await?;
    let result = store.delete_all(kind).await;
    store.close().await;

    let deleted = result.with_context(|| format!("Failed to clear {}", kind.label()))?;

    println!("clear {}", kind);
    println!("  deleted: {}", deleted);
    println!("ok");
    Ok(())
}
