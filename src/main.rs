//! # formwork CLI
//!
//! ## Usage
//!
//! ```bash
//! formwork --config ./config/formwork.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `formwork init` | Create the SQLite database and schema |
//! | `formwork check [DIR]` | Parse a surveys directory and report errors |
//! | `formwork sync` | Reconcile the surveys directory into the store |
//! | `formwork serve` | Sync, optionally watch, and serve HTTP |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Span;

use formwork::config::{self, LogConfig, StoreBackend};
use formwork::parser::SurveyParser;
use formwork::resync::Resyncer;
use formwork::{backend, logging, migrate, server};

/// formwork: surveys as directories, sessions and answers over HTTP.
///
/// All commands except `check DIR` read a TOML configuration file given by
/// `--config`.
#[derive(Parser)]
#[command(name = "formwork", version, about = "File-driven survey delivery backend")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/formwork.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Parse a surveys directory and report per-survey errors.
    ///
    /// Does not touch the store. Exits non-zero if any survey fails.
    Check {
        /// Surveys directory. Defaults to `[surveys].root` from the config.
        dir: Option<PathBuf>,
    },

    /// Parse the surveys directory and reconcile it into the store.
    Sync,

    /// Sync, then start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Check { dir: Some(dir) } = &cli.command {
        logging::init(&LogConfig::default());
        return check(dir.clone());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.log);

    match cli.command {
        Commands::Init => {
            if cfg.db.backend == StoreBackend::Memory {
                println!("In-memory backend configured; nothing to initialize.");
            } else {
                migrate::run_migrations(&cfg).await?;
                println!("Database initialized successfully.");
            }
        }
        Commands::Check { dir } => {
            check(dir.unwrap_or_else(|| cfg.surveys.root.clone()))?;
        }
        Commands::Sync => {
            let store = backend::open_store(&cfg).await?;
            let resyncer = Resyncer::new(&cfg.surveys.root, store, tracing::info_span!("resync"));
            let report = resyncer.resync().await?;

            println!(
                "Synced surveys: {} created, {} updated, {} marked deleted.",
                report.created, report.updated, report.deleted
            );
            for e in &report.parse_errors {
                println!("  parse error  {}: {}", e.name, e.error);
            }
            for e in &report.failed {
                println!("  not saved    {}: {}", e.name, e.error);
            }
            if !report.failed.is_empty() {
                anyhow::bail!("{} survey(s) could not be saved", report.failed.len());
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn check(dir: PathBuf) -> anyhow::Result<()> {
    let result = SurveyParser::new(dir, Span::none()).read()?;

    for s in &result.surveys {
        println!(
            "ok     {} ({} questions, hash {})",
            s.name,
            s.config.questions().len(),
            s.config.hash.get(..12).unwrap_or(&s.config.hash)
        );
    }
    for e in &result.errors {
        println!("error  {}: {}", e.name, e.error);
    }

    if !result.errors.is_empty() {
        anyhow::bail!("{} survey(s) failed to parse", result.errors.len());
    }
    println!("{} survey(s) OK.", result.surveys.len());
    Ok(())
}
