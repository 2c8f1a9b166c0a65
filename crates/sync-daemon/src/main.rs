//! Bulk Sync Daemon
//!
//! Resumable, checkpointed bulk indexing of stored records into search indices.
//!
//! # Usage
//!
//! ```bash
//! sync-daemon ingest records.jsonl
//! sync-daemon index [--fresh] [--put-mapping] [--per-page N]
//! sync-daemon step
//! sync-daemon watch [--idle-ms MS]
//! sync-daemon status
//! sync-daemon cancel
//! sync-daemon reindexing post [--tenant ID]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/bulk-sync/config.toml)
//! 3. Environment variables (SYNC_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use sync_daemon::{
    cancel_job, check_reindexing, handle_ingest, init_logging, load_settings, run_index, run_step,
    run_watch, show_status, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Ingest { path, db_path } => {
            handle_ingest(&settings, &path, db_path.as_deref())?;
        }
        Commands::Index { fresh, args } => {
            run_index(&settings, fresh, &args)?;
        }
        Commands::Step { args } => {
            run_step(&settings, &args)?;
        }
        Commands::Watch { idle_ms, args } => {
            run_watch(&settings, idle_ms, &args).await?;
        }
        Commands::Status => {
            show_status(&settings)?;
        }
        Commands::Cancel => {
            cancel_job(&settings)?;
        }
        Commands::Reindexing { kind, tenant } => {
            check_reindexing(&settings, &kind, tenant)?;
        }
    }

    Ok(())
}
