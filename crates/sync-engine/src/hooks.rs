//! Extension points for a sync run.
//!
//! `SyncHooks` bundles the filters (methods returning a possibly changed
//! value) and the lifecycle observers of a run. Every method has a no-op
//! default, so implementors override only what they need.

use sync_types::{ContentKind, ObjectId, Scope, StoredRecord};

use crate::args::SyncArgs;
use crate::job::{LastSyncReport, SyncJob, WorkItem};
use crate::registry::Indexable;
use crate::sink::{BulkResponse, IndexResponse, TransportError};
use crate::source::QueryArgs;

pub trait SyncHooks: Send + Sync {
    // ===== Filters =====

    /// Veto indexing of one record; vetoed records are counted skipped.
    fn skip_record(&self, _record: &StoredRecord, _indexable: &Indexable) -> bool {
        false
    }

    /// Adjust source query arguments before each query.
    fn transform_query(&self, _scope: &Scope, args: QueryArgs) -> QueryArgs {
        args
    }

    /// Adjust the default page size.
    fn per_page(&self, default: usize) -> usize {
        default
    }

    /// Adjust the number of delivery attempts per batch.
    fn batch_attempts(&self, attempts: u32) -> u32 {
        attempts
    }

    /// Skip the mapping reset of the current item.
    fn skip_mapping_reset(&self, _job: &SyncJob) -> bool {
        false
    }

    /// Adjust a freshly built job before it is persisted.
    fn prepare_job(&self, job: SyncJob) -> SyncJob {
        job
    }

    /// Override the answer of the reindex-in-progress query.
    fn full_reindexing(&self, _kind: &ContentKind, reindexing: bool) -> bool {
        reindexing
    }

    // ===== Observers =====

    fn before_build(&self, _args: &SyncArgs) {}

    fn job_started(&self, _job: &SyncJob) {}

    fn before_query(&self, _job: &SyncJob, _item: &WorkItem) {}

    fn before_batch(&self, _job: &SyncJob) {}

    fn after_batch(&self, _job: &SyncJob) {}

    fn new_attempt(&self, _attempt: u32, _total_attempts: u32) {}

    fn after_object_index(
        &self,
        _scope: &Scope,
        _id: ObjectId,
        _result: &Result<IndexResponse, TransportError>,
    ) {
    }

    fn after_bulk_index(
        &self,
        _scope: &Scope,
        _ids: &[ObjectId],
        _result: &Result<BulkResponse, TransportError>,
    ) {
    }

    fn after_mapping(&self, _job: &SyncJob, _scope: &Scope, _ok: bool) {}

    fn after_work_item(&self, _job: &SyncJob, _item: &WorkItem) {}

    fn after_job(&self, _report: &LastSyncReport) {}
}

/// Hooks that change nothing.
pub struct NoHooks;

impl SyncHooks for NoHooks {}
