//! Persisted job state.
//!
//! A `SyncJob` is the checkpoint of a running sync. It is written back whole
//! to the checkpoint store after every discrete step, so a crash loses at most
//! one step of progress.

use std::collections::VecDeque;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use sync_types::{ContentKind, ObjectId, Scope, TenantId};

use crate::args::{SyncArgs, SyncMethod};
use crate::error::SyncError;
use crate::store::CheckpointStore;

/// Key of the in-progress job
pub const JOB_KEY: &str = "sync_job";
/// Key of the last completed job's report
pub const LAST_REPORT_KEY: &str = "last_index";
/// Epoch seconds of the last job build
pub const LAST_SYNC_AT_KEY: &str = "last_sync_at";
/// Stale flag cleared when a job is built
pub const NEED_UPGRADE_KEY: &str = "need_upgrade_sync";
/// Stale flag cleared when a job is built
pub const FEATURE_AUTO_ACTIVATED_KEY: &str = "feature_auto_activated_sync";

/// Key of the last completed job's report for one method
pub fn method_report_key(method: SyncMethod) -> String {
    format!("last_{}_index", method)
}

/// Human readable timestamp, e.g. "Mon, January 15, 2024 10:30".
pub fn display_time(time: DateTime<Local>) -> String {
    time.format("%a, %B %d, %Y %H:%M").to_string()
}

/// Record counters plus accumulated error lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTotals {
    pub total: u64,
    pub synced: u64,
    pub skipped: u64,
    pub failed: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SyncTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: &SyncTotals) {
        self.total += other.total;
        self.synced += other.synced;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.errors.extend(other.errors.iter().cloned());
    }

    /// Records handled so far (synced + skipped + failed).
    pub fn accounted(&self) -> u64 {
        self.synced + self.skipped + self.failed
    }
}

/// One (tenant, content kind) pair to be fully indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Owning tenant (None for tenant-global kinds)
    #[serde(default)]
    pub tenant: Option<TenantId>,

    /// Tenant URL (domain + path), for reporting
    #[serde(default)]
    pub url: Option<String>,

    pub kind: ContentKind,

    /// Destination index must be recreated before indexing
    pub put_mapping: bool,

    /// Mapping reset already ran for this item
    #[serde(default)]
    pub mapping_reset: bool,

    /// Records the source reported for this item
    #[serde(default)]
    pub found_items: u64,

    /// Counters for this item, folded into job totals on completion
    #[serde(default)]
    pub counters: SyncTotals,

    /// Resume point for advanced pagination
    #[serde(default)]
    pub last_processed_id: Option<ObjectId>,
}

impl WorkItem {
    pub fn new(scope: Scope, put_mapping: bool) -> Self {
        Self {
            tenant: scope.tenant,
            url: None,
            kind: scope.kind,
            put_mapping,
            mapping_reset: false,
            found_items: 0,
            counters: SyncTotals::new(),
            last_processed_id: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_found_items(mut self, found: u64) -> Self {
        self.found_items = found;
        self
    }

    pub fn scope(&self) -> Scope {
        Scope {
            tenant: self.tenant,
            kind: self.kind.clone(),
        }
    }

    /// Clear the counters when the item becomes current.
    pub fn reset_counters(&mut self) {
        self.counters = SyncTotals::new();
        self.last_processed_id = None;
    }
}

/// Where a job stands.
///
/// A job is built, then works through its stack, then drains pending aliases
/// and finally completes, which discards the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// A current item is set or the stack is non-empty
    HasWork,
    /// Only alias targets remain
    DrainingAliases,
    /// Nothing remains; completion will fold totals and discard the job
    Complete,
}

/// The persisted checkpoint of a running sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub method: SyncMethod,

    /// Items were built with mapping (re)creation requested
    pub put_mapping: bool,

    /// Cursor within the current work item's records
    pub offset: u64,

    /// Items not yet started, in processing order
    pub work_stack: VecDeque<WorkItem>,

    /// The item in progress
    #[serde(default)]
    pub current: Option<WorkItem>,

    /// Content kinds awaiting cross-tenant alias creation
    #[serde(default)]
    pub pending_alias_targets: VecDeque<ContentKind>,

    /// Aggregate of completed items
    #[serde(default)]
    pub totals: SyncTotals,

    /// Built in multi-tenant mode
    #[serde(default)]
    pub network: bool,

    /// Arguments the job was built with
    #[serde(default)]
    pub args: SyncArgs,

    /// Start time (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub start_display_time: String,
}

impl SyncJob {
    /// Create an empty job for the given arguments.
    pub fn new(args: SyncArgs, network: bool) -> Self {
        Self {
            method: args.method,
            put_mapping: args.put_mapping,
            offset: args.offset,
            work_stack: VecDeque::new(),
            current: None,
            pending_alias_targets: VecDeque::new(),
            totals: SyncTotals::new(),
            network,
            args,
            started_at: Utc::now(),
            start_display_time: display_time(Local::now()),
        }
    }

    /// True iff a current item is set or the stack is non-empty.
    pub fn has_items_to_process(&self) -> bool {
        self.current.is_some() || !self.work_stack.is_empty()
    }

    pub fn has_alias_to_create(&self) -> bool {
        !self.pending_alias_targets.is_empty()
    }

    pub fn phase(&self) -> SyncPhase {
        if self.has_items_to_process() {
            SyncPhase::HasWork
        } else if self.has_alias_to_create() {
            SyncPhase::DrainingAliases
        } else {
            SyncPhase::Complete
        }
    }

    /// Queue a content kind for alias creation once.
    pub fn add_alias_target(&mut self, kind: &ContentKind) {
        if !self.pending_alias_targets.contains(kind) {
            self.pending_alias_targets.push_back(kind.clone());
        }
    }

    /// Whether `kind` (for `tenant`, or any tenant when None) is being fully
    /// reindexed.
    ///
    /// Scans the stack, then the current item. The first entry for the kind
    /// without mapping (re)creation ends the scan with false.
    pub fn is_full_reindexing(&self, kind: &ContentKind, tenant: Option<TenantId>) -> bool {
        let mut reindexing = false;
        for item in self.work_stack.iter().chain(self.current.iter()) {
            if &item.kind != kind {
                continue;
            }
            if !item.put_mapping {
                return false;
            }
            if tenant.is_none() || item.tenant == tenant {
                reindexing = true;
            }
        }
        reindexing
    }

    /// Seconds elapsed since the job started.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::from)
    }

    /// Load the in-progress job, if any.
    pub fn load(store: &dyn CheckpointStore) -> Result<Option<Self>, SyncError> {
        match store.get(JOB_KEY)? {
            Some(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write the whole job back.
    pub fn save(&self, store: &dyn CheckpointStore) -> Result<(), SyncError> {
        store.set(JOB_KEY, &self.to_bytes()?)
    }
}

/// Report of the last completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSyncReport {
    pub method: SyncMethod,

    #[serde(flatten)]
    pub totals: SyncTotals,

    /// Human readable end time
    pub end_date_time: String,

    /// End time, epoch seconds
    pub end_time_gmt: i64,

    /// Duration in seconds
    pub total_time: f64,
}

impl LastSyncReport {
    /// Build the report of a finished job.
    pub fn from_job(job: &SyncJob) -> Self {
        let now = Utc::now();
        Self {
            method: job.method,
            totals: job.totals.clone(),
            end_date_time: display_time(now.with_timezone(&Local)),
            end_time_gmt: now.timestamp(),
            total_time: job.elapsed_secs(now),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::from)
    }

    /// Load the last report (any method).
    pub fn load(store: &dyn CheckpointStore) -> Result<Option<Self>, SyncError> {
        Self::load_key(store, LAST_REPORT_KEY)
    }

    fn load_key(store: &dyn CheckpointStore, key: &str) -> Result<Option<Self>, SyncError> {
        match store.get(key)? {
            Some(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store under the general and the per-method key.
    pub fn save(&self, store: &dyn CheckpointStore) -> Result<(), SyncError> {
        let bytes = self.to_bytes()?;
        store.set(&method_report_key(self.method), &bytes)?;
        store.set(LAST_REPORT_KEY, &bytes)
    }
}
