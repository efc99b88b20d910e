//! Clever - session store administration
//!
//! Main entry point for the Clever CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use clever_session::{JsonCodec, SessionStore};
use clever_session_sqlite::SqliteRepository;

mod commands;
mod config;

use commands::{config as config_cmd, sessions};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Clever - inspect and administer the session store
#[derive(Parser)]
#[command(name = "clever")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file loaded on top of the discovered ones
    #[arg(long, global = true, env = "CLEVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session database path (overrides config)
    #[arg(long, global = true, env = "CLEVER_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and manage stored sessions
    Sessions(sessions::SessionsArgs),

    /// Show the effective configuration
    Config(config_cmd::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "clever=debug,clever_session=debug,clever_session_sqlite=debug,info"
    } else {
        "clever=info,clever_session=warn,clever_session_sqlite=warn,warn"
    };

    let log_dir = config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "clever.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "clever=trace,clever_session=trace,clever_session_sqlite=trace,info",
                )),
        )
        .init();

    let mut loaded = config::load_config(None, cli.config.as_deref())?;
    if let Some(db) = cli.db {
        loaded.config.set_database_path(db);
    }
    tracing::debug!(sources = ?loaded.loaded_from(), "Configuration loaded");

    match cli.command {
        Commands::Config(args) => config_cmd::run(args, &loaded, cli.json),
        Commands::Sessions(args) => {
            let db_path = loaded.config.database_path();
            let repository = Arc::new(SqliteRepository::open(&db_path).with_context(|| {
                format!("failed to open session database {}", db_path.display())
            })?);
            tracing::debug!(path = %db_path.display(), "Session database opened");
            let store = SessionStore::new(
                repository.clone(),
                Arc::new(JsonCodec::new()),
                loaded.config.store_config(),
            );

            let ctx = commands::Context {
                store,
                repository,
                json_output: cli.json,
                verbose: cli.verbose,
            };
            sessions::run(args, &ctx).await
        }
    }
}
