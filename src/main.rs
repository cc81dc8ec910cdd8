//! # Docshelf CLI (`shelf`)
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf build` | Rebuild the search index from every supported document |
//! | `shelf search "<query>"` | Search the index |
//! | `shelf status` | Report whether the index is stale |
//! | `shelf files` | Browse documents, newest first |
//! | `shelf metadata` | Print the last build time |
//! | `shelf serve` | Start the HTTP API server |
//!
//! Commands that reach the drive need an OAuth access token, given with
//! `--token` or through the environment variable named by
//! `storage.token_env` (`SHELF_ACCESS_TOKEN` by default).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docshelf::builder::run_build_cli;
use docshelf::config::{self, Config};
use docshelf::drive::DriveClient;
use docshelf::files::run_files;
use docshelf::progress::ProgressMode;
use docshelf::search::run_search;
use docshelf::server::run_server;
use docshelf::staleness::run_status;
use docshelf::store::{run_metadata, IndexStore};
use docshelf::traits::FileStorage;

/// Docshelf: keyword search over the documents in your cloud drive.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Docshelf: index and search the PDF, Word and PowerPoint files in your drive",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/shelf.toml`. Built-in defaults are used when
    /// the default file does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// OAuth access token. Overrides the token environment variable.
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

const DEFAULT_CONFIG: &str = "./config/shelf.toml";

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the search index.
    ///
    /// Lists every PDF, DOCX and PPTX file, extracts its text and replaces
    /// the index blob in one write. Files that fail are skipped.
    Build {
        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search the index (case-insensitive substring match).
    Search {
        query: String,

        /// Result page (1-based).
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Check whether documents changed since the last build.
    Status,

    /// Browse documents, newest first.
    Files {
        /// Only names containing this text.
        #[arg(long)]
        q: Option<String>,

        /// Continuation token printed by the previous page.
        #[arg(long)]
        page_token: Option<String>,
    },

    /// Print the time of the last completed build.
    Metadata,

    /// Start the HTTP API server.
    Serve,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docshelf=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

fn connect(cfg: &Config, token: Option<String>) -> anyhow::Result<Arc<dyn FileStorage>> {
    let token = match token {
        Some(t) => t,
        None => std::env::var(&cfg.storage.token_env).with_context(|| {
            format!(
                "No access token: pass --token or set {}",
                cfg.storage.token_env
            )
        })?,
    };
    Ok(Arc::new(DriveClient::new(&cfg.storage, token)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Build { progress } => {
            let storage = connect(&cfg, cli.token)?;
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();
            run_build_cli(&cfg, storage, reporter.as_ref()).await?;
        }
        Commands::Search { query, page } => {
            let storage = connect(&cfg, cli.token)?;
            let store = IndexStore::new(storage, cfg.storage.index_file_name.clone());
            run_search(&cfg, &store, &query, page).await?;
        }
        Commands::Status => {
            let storage = connect(&cfg, cli.token)?;
            let store = IndexStore::new(storage.clone(), cfg.storage.index_file_name.clone());
            run_status(&cfg, storage.as_ref(), &store).await?;
        }
        Commands::Files { q, page_token } => {
            let storage = connect(&cfg, cli.token)?;
            run_files(&cfg, storage.as_ref(), q, page_token).await?;
        }
        Commands::Metadata => {
            let storage = connect(&cfg, cli.token)?;
            let store = IndexStore::new(storage, cfg.storage.index_file_name.clone());
            run_metadata(&store).await?;
        }
        Commands::Serve => {
            run_server(&cfg).await?;
        }
    }

    Ok(())
}
