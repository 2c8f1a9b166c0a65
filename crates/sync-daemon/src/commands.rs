//! Command implementations for the sync daemon.
//!
//! Handles:
//! - ingest: Load JSON Lines records into RocksDB
//! - index / step / watch: Drive the sync job to completion, one step, or on a timer
//! - status / cancel / reindexing: Inspect and manage the stored job

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sync_engine::{
    ConfiguredTenants, ContentKindRegistry, LastSyncReport, ProgressMessage, ProgressSink,
    ProgressStatus, SearchSink, StorageSource, SyncConfig, SyncMethod, SyncOrchestrator,
    SyncStatus,
};
use sync_search::{IndexCatalog, SearchIndexConfig};
use sync_storage::Storage;
use sync_types::{ContentKind, Settings, StoredRecord, TenantId};

use crate::cli::IndexArgs;

/// Records written per RocksDB batch during ingest
const INGEST_BATCH: usize = 500;

/// Load configuration and apply CLI overrides.
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Prints progress messages to the terminal.
pub struct ConsoleProgressSink;

impl ProgressSink for ConsoleProgressSink {
    fn emit(&self, message: &ProgressMessage<'_>) {
        match message.status {
            ProgressStatus::Info | ProgressStatus::Success => println!("{}", message.message),
            ProgressStatus::Warning => eprintln!("Warning: {}", message.message),
            ProgressStatus::Error => eprintln!("Error: {}", message.message),
        }
    }
}

/// Opened storage, search catalog and the collaborators wired over them.
pub struct SyncRuntime {
    pub settings: Settings,
    pub storage: Arc<Storage>,
    pub source: Arc<StorageSource>,
    pub sink: Arc<SearchSink>,
}

impl SyncRuntime {
    pub fn open(settings: &Settings) -> Result<Self> {
        let db_path = settings.expanded_db_path();
        info!("Opening storage at {:?}", db_path);
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let storage = Arc::new(Storage::open(&db_path).context("Failed to open storage")?);

        let index_path = settings.expanded_search_index_path();
        fs::create_dir_all(&index_path).context("Failed to create search index directory")?;
        let catalog = IndexCatalog::new(SearchIndexConfig::new(
            index_path,
            settings.index_prefix.clone(),
        ));

        let source = Arc::new(StorageSource::new(storage.clone()));
        let sink = Arc::new(SearchSink::new(catalog, source.clone()));

        Ok(Self {
            settings: settings.clone(),
            storage,
            source,
            sink,
        })
    }

    /// Build an orchestrator over every configured content kind.
    pub fn orchestrator(&self, progress: Arc<dyn ProgressSink>) -> SyncOrchestrator {
        let registry = ContentKindRegistry::from_settings(
            &self.settings.content_kinds,
            self.source.clone(),
            self.sink.clone(),
            self.sink.clone(),
        );
        SyncOrchestrator::new(
            self.storage.clone(),
            registry,
            Arc::new(ConfiguredTenants::from_settings(&self.settings)),
            SyncConfig::from_settings(&self.settings),
        )
        .with_progress(progress)
        .with_cache(self.source.clone())
    }
}

/// Read JSON Lines records and store them. Blank lines are skipped.
pub fn ingest_records(storage: &Storage, reader: impl BufRead) -> Result<usize> {
    let mut batch = Vec::with_capacity(INGEST_BATCH);
    let mut written = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: StoredRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record on line {}", line_no + 1))?;
        batch.push(record);

        if batch.len() == INGEST_BATCH {
            written += storage.put_records(&batch).context("Failed to store records")?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        written += storage.put_records(&batch).context("Failed to store records")?;
    }

    debug!(written, "Ingested records");
    Ok(written)
}

pub fn handle_ingest(settings: &Settings, path: &str, db_path: Option<&str>) -> Result<()> {
    let mut settings = settings.clone();
    if let Some(db_path) = db_path {
        settings.db_path = db_path.to_string();
    }
    let runtime = SyncRuntime::open(&settings)?;

    let file = File::open(Path::new(path)).with_context(|| format!("Failed to open {}", path))?;
    let written = ingest_records(&runtime.storage, BufReader::new(file))?;

    println!("Ingested {} records from {}", written, path);
    Ok(())
}

/// Run the stored job, or a new one, to completion.
pub fn run_index(settings: &Settings, fresh: bool, args: &IndexArgs) -> Result<()> {
    let runtime = SyncRuntime::open(settings)?;
    let mut orchestrator = runtime.orchestrator(Arc::new(ConsoleProgressSink));

    if fresh && orchestrator.cancel()? {
        info!("Discarded stored job");
    }

    let report = orchestrator
        .run_to_completion(args.to_sync_args(SyncMethod::Cli))
        .context("Sync failed")?;
    print_report(&report)
}

/// Perform one unit of work.
pub fn run_step(settings: &Settings, args: &IndexArgs) -> Result<()> {
    let runtime = SyncRuntime::open(settings)?;
    let mut orchestrator = runtime.orchestrator(Arc::new(ConsoleProgressSink));

    if orchestrator.start_or_resume(args.to_sync_args(SyncMethod::Web))? {
        println!("Sync job started");
        return Ok(());
    }
    match orchestrator.advance()? {
        Some(phase) => println!("Phase: {:?}", phase),
        None => println!("Sync job complete"),
    }
    Ok(())
}

/// Advance the job once per tick until it completes or Ctrl+C is pressed.
///
/// Ctrl+C stops between steps, leaving the checkpoint resumable.
pub async fn run_watch(
    settings: &Settings,
    idle_ms: Option<u64>,
    args: &IndexArgs,
) -> Result<()> {
    let runtime = SyncRuntime::open(settings)?;
    let mut orchestrator = runtime.orchestrator(Arc::new(ConsoleProgressSink));
    orchestrator.start_or_resume(args.to_sync_args(SyncMethod::Web))?;

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, stopping after the current step...");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    let idle = Duration::from_millis(idle_ms.unwrap_or(settings.step_idle_ms));
    let mut interval = tokio::time::interval(idle);
    let mut steps = 0u64;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                println!("Stopped after {} steps; run again to resume", steps);
                return Ok(());
            }
            _ = interval.tick() => {}
        }

        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = orchestrator.advance();
            (orchestrator, result)
        })
        .await
        .context("Step task failed")?;
        orchestrator = returned;
        steps += 1;

        if result?.is_none() {
            info!(steps, "Watch finished");
            return Ok(());
        }
    }
}

pub fn show_status(settings: &Settings) -> Result<()> {
    let runtime = SyncRuntime::open(settings)?;
    let orchestrator = runtime.orchestrator(Arc::new(ConsoleProgressSink));

    match orchestrator.status()? {
        SyncStatus::Running(job) => {
            println!("Sync job running");
            println!("  Method: {}", job.method);
            println!("  Started: {}", job.start_display_time);
            if let Some(item) = &job.current {
                println!(
                    "  Current: {} ({}/{})",
                    item.scope(),
                    job.offset,
                    item.found_items
                );
            }
            println!("  Remaining items: {}", job.work_stack.len());
            println!("  Pending aliases: {}", job.pending_alias_targets.len());
            println!(
                "  Totals: {} synced, {} skipped, {} failed",
                job.totals.synced, job.totals.skipped, job.totals.failed
            );
        }
        SyncStatus::Idle(Some(report)) => {
            println!("No sync job running");
            print_report(&report)?;
        }
        SyncStatus::Idle(None) => println!("No sync job running"),
    }

    let stats = runtime.storage.get_stats().context("Failed to read storage stats")?;
    println!(
        "Storage: {} records, {} checkpoints, {} bytes",
        stats.record_count, stats.checkpoint_count, stats.disk_usage_bytes
    );
    Ok(())
}

pub fn cancel_job(settings: &Settings) -> Result<()> {
    let runtime = SyncRuntime::open(settings)?;
    let mut orchestrator = runtime.orchestrator(Arc::new(ConsoleProgressSink));

    if orchestrator.cancel()? {
        println!("Sync job cancelled");
    } else {
        println!("No sync job to cancel");
    }
    Ok(())
}

pub fn check_reindexing(settings: &Settings, kind: &str, tenant: Option<u64>) -> Result<()> {
    let runtime = SyncRuntime::open(settings)?;
    let mut orchestrator = runtime.orchestrator(Arc::new(ConsoleProgressSink));

    let reindexing =
        orchestrator.is_full_reindexing(&ContentKind::new(kind), tenant.map(TenantId))?;
    println!("{}", reindexing);
    Ok(())
}

fn print_report(report: &LastSyncReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to format report")?;
    println!("{}", json);
    Ok(())
}
