//! Sync daemon library exports.
//!
//! This crate provides the CLI driver binary for bulk-sync.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (ingest, index, step, watch, status, cancel)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, IndexArgs};
pub use commands::{
    cancel_job, check_reindexing, handle_ingest, ingest_records, init_logging, load_settings,
    run_index, run_step, run_watch, show_status, ConsoleProgressSink, SyncRuntime,
};
