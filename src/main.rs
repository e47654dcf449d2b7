//! # lex-ingest CLI (`lex`)
//!
//! ```bash
//! lex --config ./config/lex.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lex init` | Create the SQLite database and schema |
//! | `lex ingest <path>` | Run one batch from a manifest or directory |
//! | `lex stats` | Document count and per-category breakdown |
//! | `lex get <title>` | Print a stored record as JSON |
//! | `lex completions <shell>` | Shell completion script |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`); stdout carries
//! command output only.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lex_ingest::progress::ProgressMode;
use lex_ingest::{config, get, ingest, migrate, stats};

/// Ingest legal source documents into a deduplicated SQLite store.
#[derive(Parser)]
#[command(
    name = "lex",
    about = "Ingest legal source documents into a deduplicated SQLite store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Run one batch through the pipeline.
    ///
    /// PATH is a manifest (JSON array or JSON lines of
    /// `{title?, url, raw_content, content_type}`) or a directory of
    /// .html/.txt/.md/.pdf files. Without PATH the configured
    /// `[connectors.filesystem]` root is scanned.
    Ingest {
        path: Option<PathBuf>,

        /// Source profile from `[profiles.<name>]`.
        #[arg(long)]
        profile: Option<String>,

        /// Treat PATH as a directory.
        #[arg(long)]
        dir: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Run every stage and the dedup check without writing.
        #[arg(long)]
        dry_run: bool,

        /// Print the full batch report as JSON.
        #[arg(long)]
        json: bool,

        /// Progress on stderr. Defaults to `human` on a terminal, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show document counts per category.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Print a stored record by title.
    Get { title: String },

    /// Generate shell completions.
    Completions { shell: Shell },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "lex", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            profile,
            dir,
            limit,
            dry_run,
            json,
            progress,
        } => {
            let args = ingest::IngestArgs {
                path,
                profile,
                dir,
                limit,
                dry_run,
                json,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            ingest::run_ingest(&cfg, &args).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Get { title } => {
            get::run_get(&cfg, &title).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}
