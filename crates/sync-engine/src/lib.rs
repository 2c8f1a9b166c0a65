//! Resumable, checkpointed bulk indexing for bulk-sync.
//!
//! This crate walks the records of every registered content kind, across
//! tenants, and pushes them to the search destination in batches. The job
//! state is written to a checkpoint store after every step, so a run can be
//! driven by one long call or by many short ones, possibly from different
//! processes.
//!
//! ## Key Components
//!
//! - [`SyncOrchestrator`]: the step driver and state machine
//! - [`SyncJob`] / [`WorkItem`]: the persisted checkpoint
//! - [`CheckpointStore`]: durable key-value persistence (RocksDB or memory)
//! - [`SourceAdapter`] / [`BulkSink`] / [`IndexAdmin`]: collaborator seams
//! - [`SyncHooks`]: filters and lifecycle observers
//! - [`ProgressSink`]: structured progress messages
//! - [`StorageSource`] / [`SearchSink`]: RocksDB source and Tantivy sink
//!
//! ## Example
//!
//! ```ignore
//! use sync_engine::{SyncArgs, SyncConfig, SyncOrchestrator};
//!
//! let mut orchestrator = SyncOrchestrator::new(store, registry, tenants, SyncConfig::default());
//!
//! // One call...
//! let report = orchestrator.run_to_completion(SyncArgs::default())?;
//!
//! // ...or one unit of work per call
//! orchestrator.start_or_resume(SyncArgs::default())?;
//! while orchestrator.advance()?.is_some() {}
//! ```

pub mod args;
mod batch;
mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod job;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod search_sink;
pub mod sink;
pub mod source;
pub mod storage_source;
pub mod store;

#[cfg(test)]
mod test_support;

pub use args::{SyncArgs, SyncMethod};
pub use config::{BatchPlan, SyncConfig};
pub use context::{StepCache, StepContext};
pub use error::SyncError;
pub use hooks::{NoHooks, SyncHooks};
pub use job::{LastSyncReport, SyncJob, SyncPhase, SyncTotals, WorkItem};
pub use orchestrator::{SyncOrchestrator, SyncStatus};
pub use progress::{
    LoggingProgressSink, MemoryProgressSink, NoOpProgressSink, ProgressMessage, ProgressSink,
    ProgressStatus, RecordedMessage,
};
pub use registry::{ConfiguredTenants, ContentKindRegistry, Indexable, TenantDirectory};
pub use search_sink::SearchSink;
pub use sink::{
    BulkItem, BulkResponse, BulkSink, IndexAdmin, IndexResponse, ItemError, TransportError,
};
pub use source::{QueryArgs, QueryPage, SourceAdapter, SourceError};
pub use storage_source::StorageSource;
pub use store::{CheckpointStore, MemoryCheckpointStore};
