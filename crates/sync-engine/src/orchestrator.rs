//! The step driver.
//!
//! `SyncOrchestrator` owns the job state machine: it builds a job, advances
//! it one discrete step at a time (a work-item batch or an alias), and
//! completes it. Every progress message persists the job first, so the stored
//! checkpoint is never behind what observers were told.
//!
//! Only checkpoint store failures are returned to the caller. After such a
//! failure the in-memory job is dropped and the next call reloads the last
//! persisted state, which makes retrying a step safe.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use sync_types::{ContentKind, Scope, TenantId};

use crate::args::SyncArgs;
use crate::batch::{account, batch_query, deliver};
use crate::builder::JobBuilder;
use crate::config::{BatchPlan, SyncConfig};
use crate::context::{StepCache, StepContext};
use crate::error::SyncError;
use crate::hooks::{NoHooks, SyncHooks};
use crate::job::{
    LastSyncReport, SyncJob, SyncPhase, FEATURE_AUTO_ACTIVATED_KEY, JOB_KEY, LAST_SYNC_AT_KEY,
    NEED_UPGRADE_KEY,
};
use crate::progress::{LoggingProgressSink, ProgressMessage, ProgressSink, ProgressStatus};
use crate::registry::{ContentKindRegistry, Indexable, TenantDirectory};
use crate::source::QueryPage;
use crate::store::CheckpointStore;

const CONTEXT_BATCH: &str = "index_next_batch";

/// What a status query found.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    /// A job checkpoint exists
    Running(SyncJob),
    /// No job; the last completed report, if any
    Idle(Option<LastSyncReport>),
}

/// Drives one sync job against its collaborators.
pub struct SyncOrchestrator {
    store: Arc<dyn CheckpointStore>,
    registry: ContentKindRegistry,
    tenants: Arc<dyn TenantDirectory>,
    hooks: Arc<dyn SyncHooks>,
    progress: Arc<dyn ProgressSink>,
    config: SyncConfig,
    job: Option<SyncJob>,
    context: StepContext,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        registry: ContentKindRegistry,
        tenants: Arc<dyn TenantDirectory>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            registry,
            tenants,
            hooks: Arc::new(NoHooks),
            progress: Arc::new(LoggingProgressSink),
            config,
            job: None,
            context: StepContext::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SyncHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Register a cache to reset after every work-item step.
    pub fn with_cache(mut self, cache: Arc<dyn StepCache>) -> Self {
        self.context.register_cache(cache);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContentKindRegistry {
        &self.registry
    }

    /// The job held in memory, if any.
    pub fn job(&self) -> Option<&SyncJob> {
        self.job.as_ref()
    }

    /// Replace the in-memory job with the stored checkpoint.
    pub fn load(&mut self) -> Result<Option<&SyncJob>, SyncError> {
        self.job = SyncJob::load(self.store.as_ref())?;
        Ok(self.job.as_ref())
    }

    fn ensure_loaded(&mut self) -> Result<Option<&SyncJob>, SyncError> {
        if self.job.is_none() {
            self.job = SyncJob::load(self.store.as_ref())?;
        }
        Ok(self.job.as_ref())
    }

    fn take_job(&mut self) -> Result<SyncJob, SyncError> {
        match self.job.take() {
            Some(job) => Ok(job),
            None => SyncJob::load(self.store.as_ref())?.ok_or(SyncError::NoJob),
        }
    }

    // ===== Building =====

    /// Build and persist a new job.
    ///
    /// Refused with `JobInProgress` while a checkpoint exists.
    pub fn start(&mut self, args: SyncArgs) -> Result<(), SyncError> {
        if self.ensure_loaded()?.is_some() {
            return Err(SyncError::JobInProgress);
        }

        self.hooks.before_build(&args);

        let builder = JobBuilder {
            registry: &self.registry,
            tenants: self.tenants.as_ref(),
            hooks: self.hooks.as_ref(),
            config: &self.config,
        };
        let job = builder.build(&args)?;

        let now = Utc::now().timestamp().to_string();
        self.store.set(LAST_SYNC_AT_KEY, now.as_bytes())?;
        self.store.delete(NEED_UPGRADE_KEY)?;
        self.store.delete(FEATURE_AUTO_ACTIVATED_KEY)?;

        self.hooks.job_started(&job);
        let job = self.hooks.prepare_job(job);
        job.save(self.store.as_ref())?;

        info!(
            method = %job.method,
            items = job.work_stack.len(),
            put_mapping = job.put_mapping,
            "Sync job started"
        );
        self.job = Some(job);
        Ok(())
    }

    /// Resume the stored job, or start a new one when there is none.
    ///
    /// Returns true when a new job was built.
    pub fn start_or_resume(&mut self, args: SyncArgs) -> Result<bool, SyncError> {
        if let Some(job) = self.ensure_loaded()? {
            info!(
                offset = job.offset,
                remaining = job.work_stack.len(),
                "Resuming sync job"
            );
            return Ok(false);
        }
        self.start(args)?;
        Ok(true)
    }

    // ===== Stepping =====

    /// True iff a job exists and has a current item or stacked items.
    pub fn has_items_to_process(&mut self) -> Result<bool, SyncError> {
        Ok(self
            .ensure_loaded()?
            .map_or(false, |job| job.has_items_to_process()))
    }

    pub fn has_alias_to_create(&mut self) -> Result<bool, SyncError> {
        Ok(self
            .ensure_loaded()?
            .map_or(false, |job| job.has_alias_to_create()))
    }

    /// Run one work-item step: start the next item if none is current, reset
    /// its mapping once if requested, then index one batch.
    pub fn process_next_step(&mut self) -> Result<(), SyncError> {
        let mut job = self.take_job()?;
        let result = self.work_item_step(&mut job);
        self.context.clear();
        if result.is_ok() {
            self.job = Some(job);
        }
        result
    }

    fn work_item_step(&mut self, job: &mut SyncJob) -> Result<(), SyncError> {
        if job.current.is_none() {
            let Some(mut item) = job.work_stack.pop_front() else {
                return Ok(());
            };
            item.reset_counters();
            let message = self.item_start_message(job, &item.scope());
            job.current = Some(item);
            self.emit(Some(&*job), &message, ProgressStatus::Success, "")?;
        }

        self.reset_mapping(job)?;
        self.index_next_batch(job)
    }

    fn item_start_message(&self, job: &SyncJob, scope: &Scope) -> String {
        let plural = self.plural_label(&scope.kind);
        match scope.tenant {
            Some(tenant) if job.network => format!("Indexing {} on site {}...", plural, tenant),
            None => format!("Indexing {} (globally)...", plural),
            Some(_) => format!("Indexing {}...", plural),
        }
    }

    fn plural_label(&self, kind: &ContentKind) -> String {
        self.registry
            .get(kind)
            .map(Indexable::plural_label)
            .unwrap_or_else(|| kind.to_string())
    }

    /// " on site N" for tenant items of network jobs.
    fn site_suffix(job: &SyncJob, tenant: Option<TenantId>) -> String {
        match tenant {
            Some(tenant) if job.network => format!(" on site {}", tenant),
            _ => String::new(),
        }
    }

    fn reset_mapping(&self, job: &mut SyncJob) -> Result<(), SyncError> {
        let scope = match job.current.as_mut() {
            Some(item) if item.put_mapping && !item.mapping_reset => {
                item.mapping_reset = true;
                item.scope()
            }
            _ => return Ok(()),
        };

        if self.hooks.skip_mapping_reset(job) {
            info!(scope = %scope, "Mapping reset skipped");
            return Ok(());
        }
        // An unregistered kind is reported by the batch step
        let Some(indexable) = self.registry.get(&scope.kind) else {
            return Ok(());
        };

        let deleted = indexable.admin.delete_index(&scope);
        let ok = indexable.admin.put_mapping(&scope);
        debug!(scope = %scope, deleted, ok, "Mapping reset");
        self.hooks.after_mapping(job, &scope, ok);

        if ok {
            self.emit(Some(&*job), "Mapping sent", ProgressStatus::Success, "")
        } else {
            self.emit(Some(&*job), "Mapping failed", ProgressStatus::Error, "")
        }
    }

    fn index_next_batch(&mut self, job: &mut SyncJob) -> Result<(), SyncError> {
        let Some(item) = job.current.as_ref() else {
            return Ok(());
        };
        let scope = item.scope();

        let Some(indexable) = self.registry.get(&item.kind) else {
            let message = SyncError::UnknownContentKind(item.kind.to_string()).to_string();
            return self.abandon_item(job, message);
        };

        let plan = self.config.resolve(&job.args, self.hooks.as_ref());
        let query = self.hooks.transform_query(
            &scope,
            batch_query(&job.args, &plan, job.offset, item.last_processed_id),
        );
        self.hooks.before_query(job, item);

        let page = match indexable.source.query(&scope, &query) {
            Ok(page) => page,
            Err(e) => {
                warn!(scope = %scope, offset = job.offset, error = %e, "Source query failed");
                return self.abandon_item(job, e.to_string());
            }
        };

        self.apply_page(job, indexable, &scope, &plan, query.per_page, &page)
    }

    fn apply_page(
        &self,
        job: &mut SyncJob,
        indexable: &Indexable,
        scope: &Scope,
        plan: &BatchPlan,
        page_size: usize,
        page: &QueryPage,
    ) -> Result<(), SyncError> {
        let mut queued = Vec::with_capacity(page.objects.len());
        let mut skipped = 0;
        for record in &page.objects {
            if self.hooks.skip_record(record, indexable) {
                skipped += 1;
            } else {
                queued.push(record.id);
            }
        }

        job.offset += page.objects.len() as u64;
        if let Some(item) = job.current.as_mut() {
            item.found_items = page.total_objects;
            item.counters.skipped += skipped;
            // Last queued ID; a fully skipped page still moves the resume point
            let last = queued
                .last()
                .copied()
                .or_else(|| page.objects.last().map(|record| record.id));
            if last.is_some() {
                item.last_processed_id = last;
            }
        }

        if !queued.is_empty() {
            self.hooks.before_batch(job);
            let delivery = deliver(indexable, scope, &queued, plan, self.hooks.as_ref());
            let batch = account(&delivery.outcome, queued.len(), indexable.singular());
            debug!(
                scope = %scope,
                queued = queued.len(),
                synced = batch.synced,
                failed = batch.failed,
                attempts = delivery.attempts,
                "Batch delivered"
            );
            if let Some(item) = job.current.as_mut() {
                item.counters.synced += batch.synced;
                item.counters.failed += batch.failed;
                item.counters.errors.extend(batch.errors);
            }
            self.hooks.after_batch(job);

            if let Some(warning) = batch.warning {
                self.emit(Some(&*job), &warning, ProgressStatus::Warning, CONTEXT_BATCH)?;
            }
        }

        let (found, last_id) = job
            .current
            .as_ref()
            .map(|item| (item.found_items, item.last_processed_id.unwrap_or(0)))
            .unwrap_or_default();

        if !page.objects.is_empty() {
            let message = format!(
                "Processed {}/{}. Last Object ID: {}",
                job.offset, found, last_id
            );
            self.emit(Some(&*job), &message, ProgressStatus::Info, CONTEXT_BATCH)?;
        }

        // The total ignores the resume point; only a short page ends the item
        let finished = if plan.advanced_pagination {
            page.objects.is_empty() || page.objects.len() < page_size
        } else {
            page.objects.is_empty() || job.offset >= found
        };
        if finished {
            self.complete_item(job)
        } else {
            Ok(())
        }
    }

    /// Record `message` once, count the unprocessed remainder failed and
    /// complete the current item.
    fn abandon_item(&self, job: &mut SyncJob, message: String) -> Result<(), SyncError> {
        let offset = job.offset;
        if let Some(item) = job.current.as_mut() {
            let remaining = item.found_items.saturating_sub(offset);
            item.counters.failed += remaining;
            item.counters.errors.push(message.clone());
        }
        self.emit(Some(&*job), &message, ProgressStatus::Warning, CONTEXT_BATCH)?;
        self.complete_item(job)
    }

    fn complete_item(&self, job: &mut SyncJob) -> Result<(), SyncError> {
        let Some(mut item) = job.current.take() else {
            return Ok(());
        };

        let accounted = item.counters.accounted();
        if accounted != item.found_items {
            warn!(
                scope = %item.scope(),
                found = item.found_items,
                accounted,
                "Record count changed while indexing"
            );
        }
        item.counters.total = accounted;
        job.totals.merge(&item.counters);
        job.offset = 0;

        let plural = self.plural_label(&item.kind);
        let site = Self::site_suffix(job, item.tenant);
        if item.counters.failed > 0 {
            let message = format!(
                "Number of {} index errors{}: {}",
                plural, site, item.counters.failed
            );
            self.emit(Some(&*job), &message, ProgressStatus::Warning, "")?;
        }
        let message = format!(
            "Number of {} indexed{}: {}",
            plural, site, item.counters.synced
        );
        self.emit(Some(&*job), &message, ProgressStatus::Success, "")?;

        self.hooks.after_work_item(job, &item);
        Ok(())
    }

    // ===== Draining =====

    /// Create the alias of the next pending content kind over every
    /// indexable tenant's index.
    pub fn create_next_alias(&mut self) -> Result<(), SyncError> {
        let mut job = self.take_job()?;
        let result = self.alias_step(&mut job);
        if result.is_ok() {
            self.job = Some(job);
        }
        result
    }

    fn alias_step(&self, job: &mut SyncJob) -> Result<(), SyncError> {
        let Some(kind) = job.pending_alias_targets.pop_front() else {
            return Ok(());
        };
        let plural = self.plural_label(&kind);

        let created = match self.registry.get(&kind) {
            Some(indexable) => {
                let index_names: Vec<String> = self
                    .tenants
                    .tenants(job.args.network_wide)
                    .into_iter()
                    .filter(|tenant| tenant.indexable)
                    .map(|tenant| {
                        let scope = Scope::tenant(tenant.id, kind.clone());
                        indexable.admin.index_name(&scope)
                    })
                    .collect();
                debug!(kind = %kind, indexes = index_names.len(), "Creating network alias");
                indexable.admin.create_alias(&kind, &index_names)
            }
            None => {
                warn!(kind = %kind, "Alias target is not registered");
                false
            }
        };

        if created {
            let message = format!("Network alias created for {} ...", plural);
            self.emit(Some(&*job), &message, ProgressStatus::Success, "")
        } else {
            let message = format!("Network alias creation failed for {} ...", plural);
            self.emit(Some(&*job), &message, ProgressStatus::Error, "")
        }
    }

    // ===== Completion =====

    /// Store the last-sync report and discard the job.
    pub fn complete(&mut self) -> Result<LastSyncReport, SyncError> {
        let job = self.take_job()?;
        self.context.clear();

        let report = LastSyncReport::from_job(&job);
        report.save(self.store.as_ref())?;
        self.hooks.after_job(&report);
        self.emit(None, "Sync complete", ProgressStatus::Success, "")?;

        info!(
            total = report.totals.total,
            synced = report.totals.synced,
            skipped = report.totals.skipped,
            failed = report.totals.failed,
            total_time = report.total_time,
            "Sync job complete"
        );
        Ok(report)
    }

    /// Run one unit of work of the stored job.
    ///
    /// Returns the phase of the job after the step, or None once the job was
    /// completed and discarded.
    pub fn advance(&mut self) -> Result<Option<SyncPhase>, SyncError> {
        let phase = match self.ensure_loaded()? {
            Some(job) => job.phase(),
            None => return Err(SyncError::NoJob),
        };
        match phase {
            SyncPhase::HasWork => self.process_next_step()?,
            SyncPhase::DrainingAliases => self.create_next_alias()?,
            SyncPhase::Complete => {
                self.complete()?;
                return Ok(None);
            }
        }
        Ok(self.job.as_ref().map(SyncJob::phase))
    }

    /// Resume or start a job and run it to completion.
    pub fn run_to_completion(&mut self, args: SyncArgs) -> Result<LastSyncReport, SyncError> {
        self.start_or_resume(args)?;
        while self.has_items_to_process()? {
            self.process_next_step()?;
        }
        while self.has_alias_to_create()? {
            self.create_next_alias()?;
        }
        self.complete()
    }

    // ===== Queries and management =====

    /// Whether `kind` (for `tenant`, or any tenant) is being fully reindexed.
    pub fn is_full_reindexing(
        &mut self,
        kind: &ContentKind,
        tenant: Option<TenantId>,
    ) -> Result<bool, SyncError> {
        let reindexing = self
            .ensure_loaded()?
            .map_or(false, |job| job.is_full_reindexing(kind, tenant));
        Ok(self.hooks.full_reindexing(kind, reindexing))
    }

    /// Stored job or last report, read fresh from the store.
    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        match SyncJob::load(self.store.as_ref())? {
            Some(job) => Ok(SyncStatus::Running(job)),
            None => Ok(SyncStatus::Idle(self.last_report()?)),
        }
    }

    pub fn last_report(&self) -> Result<Option<LastSyncReport>, SyncError> {
        LastSyncReport::load(self.store.as_ref())
    }

    /// Discard the job checkpoint. Returns whether a job existed.
    pub fn cancel(&mut self) -> Result<bool, SyncError> {
        let existed = self.job.is_some() || self.store.get(JOB_KEY)?.is_some();
        self.store.delete(JOB_KEY)?;
        self.job = None;
        self.context.clear();
        if existed {
            info!("Sync job cancelled");
        }
        Ok(existed)
    }

    /// Persist the job (or remove it once discarded), then report.
    fn emit(
        &self,
        job: Option<&SyncJob>,
        message: &str,
        status: ProgressStatus,
        context: &str,
    ) -> Result<(), SyncError> {
        let last_report = match job {
            Some(job) => {
                job.save(self.store.as_ref())?;
                None
            }
            None => {
                self.store.delete(JOB_KEY)?;
                LastSyncReport::load(self.store.as_ref())?
            }
        };

        self.progress.emit(&ProgressMessage {
            message,
            job,
            last_report: last_report.as_ref(),
            status,
            context,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use sync_types::{StoredRecord, TenantSettings};

    use crate::args::SyncMethod;
    use crate::job::{SyncTotals, WorkItem, LAST_REPORT_KEY};
    use crate::progress::MemoryProgressSink;
    use crate::registry::ConfiguredTenants;
    use crate::store::MemoryCheckpointStore;
    use crate::test_support::{posts, Fixture, RecordingAdmin, ScriptedSink, SinkScript};

    struct Harness {
        fixture: Fixture,
        store: Arc<MemoryCheckpointStore>,
        progress: Arc<MemoryProgressSink>,
    }

    impl Harness {
        fn new(sink: ScriptedSink) -> Self {
            Self::from_fixture(Fixture::new(sink))
        }

        fn from_fixture(fixture: Fixture) -> Self {
            Self {
                fixture,
                store: Arc::new(MemoryCheckpointStore::new()),
                progress: Arc::new(MemoryProgressSink::new()),
            }
        }

        fn tenants() -> Arc<ConfiguredTenants> {
            Arc::new(ConfiguredTenants::new(vec![
                TenantSettings::new(1),
                TenantSettings::new(2),
            ]))
        }

        /// Orchestrator over post and term only.
        fn posts_and_terms(&self, config: SyncConfig) -> SyncOrchestrator {
            let registry = self
                .fixture
                .registry_of(&[("post", "Post", "Posts"), ("term", "Term", "Terms")]);
            self.orchestrator(registry, config)
        }

        fn posts_only(&self, config: SyncConfig) -> SyncOrchestrator {
            let registry = self.fixture.registry_of(&[("post", "Post", "Posts")]);
            self.orchestrator(registry, config)
        }

        fn orchestrator(
            &self,
            registry: ContentKindRegistry,
            config: SyncConfig,
        ) -> SyncOrchestrator {
            SyncOrchestrator::new(self.store.clone(), registry, Self::tenants(), config)
                .with_progress(self.progress.clone())
        }
    }

    fn totals(report: &LastSyncReport) -> (u64, u64, u64, u64) {
        let t = &report.totals;
        (t.total, t.synced, t.skipped, t.failed)
    }

    #[test]
    fn test_scenario_posts_and_empty_terms() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=700);
        let mut orchestrator = harness.posts_and_terms(SyncConfig::default());

        orchestrator.start(SyncArgs::default()).unwrap();
        assert_eq!(orchestrator.job().unwrap().work_stack.len(), 2);

        // Step 1: first page of posts
        assert_eq!(orchestrator.advance().unwrap(), Some(SyncPhase::HasWork));
        let job = orchestrator.job().unwrap();
        assert_eq!(job.offset, 350);
        assert_eq!(job.current.as_ref().unwrap().counters.synced, 350);

        // Step 2: posts complete and fold
        assert_eq!(orchestrator.advance().unwrap(), Some(SyncPhase::HasWork));
        let job = orchestrator.job().unwrap();
        assert!(job.current.is_none());
        assert_eq!(job.offset, 0);
        assert_eq!(job.totals.synced, 700);

        // Step 3: terms complete
        assert_eq!(orchestrator.advance().unwrap(), Some(SyncPhase::Complete));
        assert!(!orchestrator.has_items_to_process().unwrap());

        // Step 4: complete
        assert_eq!(orchestrator.advance().unwrap(), None);
        let report = orchestrator.last_report().unwrap().unwrap();
        assert_eq!(totals(&report), (700, 700, 0, 0));
        assert!(!harness.store.contains(JOB_KEY));

        assert_eq!(
            harness.progress.texts(),
            vec![
                "Indexing posts...",
                "Processed 350/700. Last Object ID: 350",
                "Processed 700/700. Last Object ID: 700",
                "Number of posts indexed: 700",
                "Indexing terms...",
                "Number of terms indexed: 0",
                "Sync complete",
            ]
        );
        let last = harness.progress.messages().pop().unwrap();
        assert_eq!(last.offset, None);
        assert!(last.had_report);
    }

    #[test]
    fn test_messages_carry_persisted_job() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let mut orchestrator = harness.posts_only(SyncConfig::default().with_per_page(4));

        orchestrator.start(SyncArgs::default()).unwrap();
        orchestrator.process_next_step().unwrap();

        let stored = SyncJob::load(harness.store.as_ref()).unwrap().unwrap();
        assert_eq!(stored.offset, 4);
        let processed = &harness.progress.messages()[1];
        assert_eq!(processed.context, "index_next_batch");
        assert_eq!(processed.offset, Some(4));
        assert_eq!(processed.status, ProgressStatus::Info);
    }

    #[test]
    fn test_resume_from_checkpoint_in_new_process() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=700);

        let mut first = harness.posts_only(SyncConfig::default());
        first.start(SyncArgs::default()).unwrap();
        first.process_next_step().unwrap();
        drop(first);

        let mut second = harness.posts_only(SyncConfig::default());
        assert_eq!(second.load().unwrap().unwrap().offset, 350);
        let report = second.run_to_completion(SyncArgs::default()).unwrap();

        assert_eq!(totals(&report), (700, 700, 0, 0));
        let mut indexed = harness.fixture.sink.indexed();
        assert_eq!(indexed.len(), 700);
        indexed.dedup();
        assert_eq!(indexed.len(), 700);
    }

    #[test]
    fn test_explicit_offset_skips_leading_records() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=700);
        let mut orchestrator = harness.posts_only(SyncConfig::default());

        let report = orchestrator
            .run_to_completion(SyncArgs::default().with_offset(300))
            .unwrap();

        assert_eq!(totals(&report), (400, 400, 0, 0));
        assert_eq!(harness.fixture.sink.indexed()[0], 301);
    }

    #[test]
    fn test_retry_until_success() {
        let harness = Harness::new(
            ScriptedSink::new()
                .then(SinkScript::Transport("timeout".to_string()))
                .then(SinkScript::Transport("timeout".to_string())),
        );
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let mut orchestrator = harness.posts_only(SyncConfig::default().with_total_attempts(3));

        let report = orchestrator.run_to_completion(SyncArgs::default()).unwrap();

        assert_eq!(totals(&report), (10, 10, 0, 0));
        assert!(report.totals.errors.is_empty());
        assert_eq!(harness.fixture.sink.calls(), 3);
    }

    #[test]
    fn test_transport_failure_records_one_error() {
        let harness = Harness::new(
            ScriptedSink::new().always(SinkScript::Transport("connection refused".to_string())),
        );
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let mut orchestrator = harness.posts_only(SyncConfig::default().with_total_attempts(3));

        let report = orchestrator.run_to_completion(SyncArgs::default()).unwrap();

        assert_eq!(totals(&report), (10, 0, 0, 10));
        assert_eq!(report.totals.errors, vec!["connection refused".to_string()]);
        assert_eq!(harness.fixture.sink.calls(), 3);
        assert!(harness
            .progress
            .texts()
            .contains(&"Number of posts index errors: 10".to_string()));
    }

    #[test]
    fn test_partial_failure_lines() {
        let harness = Harness::new(ScriptedSink::new().then(SinkScript::FailIds(vec![3])));
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let mut orchestrator = harness.posts_only(SyncConfig::default());

        let report = orchestrator.run_to_completion(SyncArgs::default()).unwrap();

        assert_eq!(totals(&report), (10, 9, 0, 1));
        assert_eq!(
            report.totals.errors,
            vec!["3 (Post): [mapper_parsing_exception] bad field".to_string()]
        );
        let warning = harness
            .progress
            .messages()
            .into_iter()
            .find(|m| m.status == ProgressStatus::Warning)
            .unwrap();
        assert_eq!(warning.context, "index_next_batch");
    }

    #[test]
    fn test_empty_item_completes_in_one_step() {
        let harness = Harness::new(ScriptedSink::new());
        let mut orchestrator = harness.posts_only(SyncConfig::default());

        orchestrator.start(SyncArgs::default()).unwrap();
        orchestrator.process_next_step().unwrap();

        assert!(!orchestrator.has_items_to_process().unwrap());
        assert_eq!(orchestrator.job().unwrap().totals, SyncTotals::new());
        assert_eq!(harness.fixture.sink.calls(), 0);
        assert_eq!(
            harness.progress.texts(),
            vec!["Indexing posts...", "Number of posts indexed: 0"]
        );
    }

    #[test]
    fn test_advanced_pagination_resumes_after_last_id() {
        let harness = Harness::new(ScriptedSink::new());
        harness
            .fixture
            .source
            .add_range(&posts(1), [50, 100, 101, 150, 200]);
        let config = SyncConfig::default()
            .with_per_page(2)
            .with_advanced_pagination(true);
        let mut orchestrator = harness.posts_only(config);

        orchestrator.start(SyncArgs::default()).unwrap();
        orchestrator.process_next_step().unwrap();
        assert_eq!(
            orchestrator.job().unwrap().current.as_ref().unwrap().last_processed_id,
            Some(100)
        );

        orchestrator.process_next_step().unwrap();
        let query = harness.fixture.source.queries().pop().unwrap();
        assert_eq!(query.resume_after_id, Some(100));
        assert_eq!(query.offset, 0);
        assert_eq!(harness.fixture.sink.indexed(), vec![50, 100, 101, 150]);

        let report = orchestrator.run_to_completion(SyncArgs::default()).unwrap();
        assert_eq!(totals(&report), (5, 5, 0, 0));
    }

    #[test]
    fn test_advanced_pagination_survives_delete_behind_resume_point() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=5);
        let config = SyncConfig::default()
            .with_per_page(2)
            .with_advanced_pagination(true);
        let mut orchestrator = harness.posts_only(config);

        orchestrator.start(SyncArgs::default()).unwrap();
        orchestrator.process_next_step().unwrap();
        harness.fixture.source.remove(&posts(1), 1);

        let report = orchestrator.run_to_completion(SyncArgs::default()).unwrap();

        assert_eq!(harness.fixture.sink.indexed(), vec![1, 2, 3, 4, 5]);
        assert_eq!(totals(&report), (5, 5, 0, 0));
        assert!(harness
            .progress
            .texts()
            .contains(&"Processed 5/4. Last Object ID: 5".to_string()));
    }

    #[test]
    fn test_rejected_build_leaves_store_untouched() {
        let harness = Harness::new(ScriptedSink::new());
        harness.store.set("need_upgrade_sync", b"1").unwrap();
        let mut orchestrator = harness.posts_only(SyncConfig::default());

        let args = SyncArgs::default().with_kinds(vec![ContentKind::new("widget")]);
        assert!(matches!(
            orchestrator.start(args),
            Err(SyncError::UnknownContentKind(_))
        ));

        assert!(!harness.store.contains(LAST_SYNC_AT_KEY));
        assert!(harness.store.contains("need_upgrade_sync"));
        assert!(!harness.store.contains(JOB_KEY));
    }

    #[test]
    fn test_reindexing_query_follows_job() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let mut orchestrator = harness.posts_and_terms(SyncConfig::default());
        let post = ContentKind::new("post");

        assert!(!orchestrator.is_full_reindexing(&post, None).unwrap());

        orchestrator
            .start(SyncArgs::default().with_put_mapping(true))
            .unwrap();
        assert!(orchestrator.is_full_reindexing(&post, Some(TenantId(1))).unwrap());
        assert!(!orchestrator.is_full_reindexing(&post, Some(TenantId(2))).unwrap());

        // Posts complete in one step; terms are still queued
        orchestrator.process_next_step().unwrap();
        assert!(!orchestrator.is_full_reindexing(&post, None).unwrap());
        assert!(orchestrator
            .is_full_reindexing(&ContentKind::new("term"), None)
            .unwrap());
    }

    #[test]
    fn test_reindexing_query_reads_store() {
        let harness = Harness::new(ScriptedSink::new());
        let mut builder = harness.posts_only(SyncConfig::default());
        builder
            .start(SyncArgs::default().with_put_mapping(true))
            .unwrap();

        let mut reader = harness.posts_only(SyncConfig::default());
        assert!(reader
            .is_full_reindexing(&ContentKind::new("post"), None)
            .unwrap());
    }

    #[test]
    fn test_job_in_progress_is_refused() {
        let harness = Harness::new(ScriptedSink::new());
        let mut orchestrator = harness.posts_only(SyncConfig::default());
        orchestrator.start(SyncArgs::default()).unwrap();

        assert!(matches!(
            orchestrator.start(SyncArgs::default()),
            Err(SyncError::JobInProgress)
        ));

        let mut other = harness.posts_only(SyncConfig::default());
        assert!(matches!(
            other.start(SyncArgs::default()),
            Err(SyncError::JobInProgress)
        ));
        assert!(!other.start_or_resume(SyncArgs::default()).unwrap());
    }

    #[test]
    fn test_step_without_job() {
        let harness = Harness::new(ScriptedSink::new());
        let mut orchestrator = harness.posts_only(SyncConfig::default());
        assert!(matches!(
            orchestrator.process_next_step(),
            Err(SyncError::NoJob)
        ));
        assert!(matches!(orchestrator.advance(), Err(SyncError::NoJob)));
    }

    #[test]
    fn test_store_failure_surfaces_and_step_retries() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=700);
        let mut orchestrator = harness.posts_only(SyncConfig::default());
        orchestrator.start(SyncArgs::default()).unwrap();

        harness.store.set_fail_writes(true);
        assert!(matches!(
            orchestrator.process_next_step(),
            Err(SyncError::Checkpoint(_))
        ));
        assert!(orchestrator.job().is_none());

        harness.store.set_fail_writes(false);
        let report = orchestrator.run_to_completion(SyncArgs::default()).unwrap();
        assert_eq!(totals(&report), (700, 700, 0, 0));
    }

    #[test]
    fn test_network_job_drains_aliases() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(2), 1..=3);
        let registry = harness.fixture.registry();
        let mut orchestrator =
            harness.orchestrator(registry, SyncConfig::default().with_network(true));

        let report = orchestrator.run_to_completion(SyncArgs::default()).unwrap();

        assert_eq!(totals(&report), (3, 3, 0, 0));
        let aliases = harness.fixture.admin.aliases.lock().unwrap().clone();
        assert_eq!(
            aliases,
            vec![
                (
                    ContentKind::new("post"),
                    vec!["idx-1-post".to_string(), "idx-2-post".to_string()]
                ),
                (
                    ContentKind::new("term"),
                    vec!["idx-1-term".to_string(), "idx-2-term".to_string()]
                ),
            ]
        );

        let texts = harness.progress.texts();
        assert_eq!(texts[0], "Indexing posts on site 1...");
        assert!(texts.contains(&"Number of posts indexed on site 2: 3".to_string()));
        assert!(texts.contains(&"Indexing users (globally)...".to_string()));
        assert!(texts.contains(&"Network alias created for terms ...".to_string()));
    }

    #[test]
    fn test_failed_alias_is_reported() {
        let mut admin = RecordingAdmin::new();
        admin.alias_ok = false;
        let harness = Harness::from_fixture(Fixture::new(ScriptedSink::new()).with_admin(admin));
        let mut orchestrator = harness.posts_only(SyncConfig::default().with_network(true));

        orchestrator.start(SyncArgs::default()).unwrap();
        while orchestrator.has_items_to_process().unwrap() {
            orchestrator.process_next_step().unwrap();
        }
        assert_eq!(orchestrator.advance().unwrap(), Some(SyncPhase::Complete));

        let failed = harness.progress.messages().pop().unwrap();
        assert_eq!(failed.message, "Network alias creation failed for posts ...");
        assert_eq!(failed.status, ProgressStatus::Error);
    }

    #[test]
    fn test_mapping_reset_runs_once_per_item() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=700);
        let mut orchestrator = harness.posts_only(SyncConfig::default());

        orchestrator
            .run_to_completion(SyncArgs::default().with_put_mapping(true))
            .unwrap();

        assert_eq!(*harness.fixture.admin.mappings.lock().unwrap(), vec![posts(1)]);
        assert_eq!(*harness.fixture.admin.deleted.lock().unwrap(), vec![posts(1)]);
        let texts = harness.progress.texts();
        assert_eq!(texts[1], "Mapping sent");
        assert_eq!(texts.iter().filter(|t| *t == "Mapping sent").count(), 1);
    }

    #[test]
    fn test_mapping_failure_is_not_fatal() {
        let mut admin = RecordingAdmin::new();
        admin.mapping_ok = false;
        let harness = Harness::from_fixture(Fixture::new(ScriptedSink::new()).with_admin(admin));
        harness.fixture.source.add_range(&posts(1), 1..=5);
        let mut orchestrator = harness.posts_only(SyncConfig::default());

        let report = orchestrator
            .run_to_completion(SyncArgs::default().with_put_mapping(true))
            .unwrap();

        assert_eq!(totals(&report), (5, 5, 0, 0));
        let failed = &harness.progress.messages()[1];
        assert_eq!(failed.message, "Mapping failed");
        assert_eq!(failed.status, ProgressStatus::Error);
    }

    struct SkipEvenHooks {
        attempts: AtomicU32,
        finished_items: AtomicUsize,
        skip_mapping: bool,
    }

    impl SkipEvenHooks {
        fn new(skip_mapping: bool) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                finished_items: AtomicUsize::new(0),
                skip_mapping,
            }
        }
    }

    impl SyncHooks for SkipEvenHooks {
        fn skip_record(&self, record: &StoredRecord, _indexable: &Indexable) -> bool {
            record.id % 2 == 0
        }

        fn skip_mapping_reset(&self, _job: &SyncJob) -> bool {
            self.skip_mapping
        }

        fn new_attempt(&self, _attempt: u32, _total_attempts: u32) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
        }

        fn after_work_item(&self, _job: &SyncJob, _item: &WorkItem) {
            self.finished_items.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_skipped_records_are_counted() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let hooks = Arc::new(SkipEvenHooks::new(true));
        let mut orchestrator = harness
            .posts_and_terms(SyncConfig::default())
            .with_hooks(hooks.clone());

        let report = orchestrator
            .run_to_completion(SyncArgs::default().with_put_mapping(true))
            .unwrap();

        assert_eq!(totals(&report), (10, 5, 5, 0));
        assert_eq!(harness.fixture.sink.indexed(), vec![1, 3, 5, 7, 9]);
        assert_eq!(hooks.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.finished_items.load(Ordering::SeqCst), 2);
        assert!(harness.fixture.admin.mappings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_last_processed_id_is_last_queued() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let hooks = Arc::new(SkipEvenHooks::new(false));
        let mut orchestrator = harness
            .posts_only(SyncConfig::default().with_per_page(4))
            .with_hooks(hooks);

        orchestrator.start(SyncArgs::default()).unwrap();
        orchestrator.process_next_step().unwrap();

        // 4 was fetched but skipped
        let item = orchestrator.job().unwrap().current.clone().unwrap();
        assert_eq!(item.last_processed_id, Some(3));
        assert_eq!(
            harness.progress.texts().last().map(String::as_str),
            Some("Processed 4/10. Last Object ID: 3")
        );
    }

    #[test]
    fn test_source_failure_fails_remaining_records() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let mut orchestrator = harness.posts_only(SyncConfig::default().with_per_page(4));

        orchestrator.start(SyncArgs::default()).unwrap();
        orchestrator.process_next_step().unwrap();
        harness.fixture.source.set_fail(true);
        orchestrator.process_next_step().unwrap();

        assert!(!orchestrator.has_items_to_process().unwrap());
        let report = orchestrator.complete().unwrap();
        assert_eq!(totals(&report), (10, 4, 0, 6));
        assert_eq!(
            report.totals.errors,
            vec!["Source unavailable: database gone away".to_string()]
        );
    }

    #[test]
    fn test_report_keys_and_build_side_effects() {
        let harness = Harness::new(ScriptedSink::new());
        harness.store.set("need_upgrade_sync", b"1").unwrap();
        harness.store.set("feature_auto_activated_sync", b"1").unwrap();
        let mut orchestrator = harness.posts_only(SyncConfig::default());

        orchestrator
            .run_to_completion(SyncArgs::new(SyncMethod::Cli))
            .unwrap();

        assert!(harness.store.contains(LAST_SYNC_AT_KEY));
        assert!(harness.store.contains(LAST_REPORT_KEY));
        assert!(harness.store.contains("last_cli_index"));
        assert!(!harness.store.contains("last_web_index"));
        assert!(!harness.store.contains("need_upgrade_sync"));
        assert!(!harness.store.contains("feature_auto_activated_sync"));
        assert!(!harness.store.contains(JOB_KEY));
    }

    #[test]
    fn test_status_and_cancel() {
        let harness = Harness::new(ScriptedSink::new());
        let mut orchestrator = harness.posts_only(SyncConfig::default());

        assert_eq!(orchestrator.status().unwrap(), SyncStatus::Idle(None));
        assert!(!orchestrator.cancel().unwrap());

        orchestrator.start(SyncArgs::default()).unwrap();
        assert!(matches!(orchestrator.status().unwrap(), SyncStatus::Running(_)));

        assert!(orchestrator.cancel().unwrap());
        assert_eq!(orchestrator.status().unwrap(), SyncStatus::Idle(None));
        assert!(!orchestrator.has_items_to_process().unwrap());

        orchestrator.run_to_completion(SyncArgs::default()).unwrap();
        assert!(matches!(
            orchestrator.status().unwrap(),
            SyncStatus::Idle(Some(_))
        ));
    }

    #[derive(Default)]
    struct CountingCache {
        resets: AtomicUsize,
    }

    impl StepCache for CountingCache {
        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_caches_reset_every_step() {
        let harness = Harness::new(ScriptedSink::new());
        harness.fixture.source.add_range(&posts(1), 1..=10);
        let cache = Arc::new(CountingCache::default());
        let mut orchestrator = harness
            .posts_only(SyncConfig::default().with_per_page(5))
            .with_cache(cache.clone());

        orchestrator.start(SyncArgs::default()).unwrap();
        orchestrator.process_next_step().unwrap();
        orchestrator.process_next_step().unwrap();

        assert_eq!(cache.resets.load(Ordering::SeqCst), 2);
    }
}
