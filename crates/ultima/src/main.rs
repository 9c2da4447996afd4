// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! UltimaRAG learning daemon.
//!
//! This is the binary entry point: configuration, logging, and the
//! `serve`, `stats` and `migrate` commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;
mod stats;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ultima_config::UltimaConfig;
use ultima_core::UltimaError;
use ultima_learning::{EmbeddingService, MigrationOutcome, RuleStore, SchemaMigrator};

/// UltimaRAG learning daemon.
#[derive(Parser, Debug)]
#[command(name = "ultima", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Migrate the rules file, then learn from feedback until SIGINT/SIGTERM.
    Serve {
        /// Read newline-delimited feedback events (JSON) from stdin.
        #[arg(long)]
        stdin: bool,
    },
    /// Print guidelines statistics as JSON.
    Stats {
        /// Also print the guidelines block selected for this query type.
        #[arg(long, value_name = "QUERY_TYPE")]
        preview: Option<String>,
    },
    /// Migrate the rules file to the current schema and report the outcome.
    Migrate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => ultima_config::load_and_validate_path(path),
        None => ultima_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            ultima_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Commands::Serve { stdin } => serve::run_serve(config, stdin).await,
        Commands::Stats { preview } => stats::run_stats(&config, preview.as_deref()).await,
        Commands::Migrate => run_migrate(&config).await,
    };

    if let Err(e) = result {
        eprintln!("ultima: {e}");
        std::process::exit(1);
    }
}

/// Embedding service per config; disabled when turned off or unavailable.
pub(crate) async fn embedding_service(config: &UltimaConfig) -> EmbeddingService {
    if config.embedding.enabled {
        EmbeddingService::from_config(&config.embedding).await
    } else {
        EmbeddingService::disabled()
    }
}

async fn run_migrate(config: &UltimaConfig) -> Result<(), UltimaError> {
    let store = RuleStore::new(&config.learning.guidelines_path);
    let embeddings = embedding_service(config).await;
    let outcome = SchemaMigrator::new(store, embeddings).run().await;

    let json = serde_json::to_string_pretty(&outcome)
        .map_err(|e| UltimaError::Internal(format!("failed to render outcome: {e}")))?;
    println!("{json}");

    match outcome {
        MigrationOutcome::Failed { reason } => Err(UltimaError::Storage {
            source: reason.into(),
        }),
        _ => Ok(()),
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ultima={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
