//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sync_types::{ContentKind, ContentKindSettings, ObjectId, Scope, StoredRecord, TenantId};

use crate::registry::ContentKindRegistry;
use crate::sink::{
    BulkItem, BulkResponse, BulkSink, IndexAdmin, IndexResponse, ItemError, TransportError,
};
use crate::source::{QueryArgs, QueryPage, SourceAdapter, SourceError};

/// Source over in-memory records, applying the full query contract.
#[derive(Default)]
pub struct VecSource {
    records: Mutex<HashMap<Scope, Vec<StoredRecord>>>,
    fail: AtomicBool,
    queries: Mutex<Vec<QueryArgs>>,
}

impl VecSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_range(&self, scope: &Scope, ids: impl IntoIterator<Item = ObjectId>) {
        let mut records = self.records.lock().unwrap();
        let entry = records.entry(scope.clone()).or_default();
        entry.extend(
            ids.into_iter()
                .map(|id| StoredRecord::new(scope, id, format!("Record {}", id))),
        );
        entry.sort_by_key(|r| r.id);
    }

    pub fn remove(&self, scope: &Scope, id: ObjectId) {
        if let Some(entry) = self.records.lock().unwrap().get_mut(scope) {
            entry.retain(|r| r.id != id);
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<QueryArgs> {
        self.queries.lock().unwrap().clone()
    }
}

impl SourceAdapter for VecSource {
    fn query(&self, scope: &Scope, args: &QueryArgs) -> Result<QueryPage, SourceError> {
        self.queries.lock().unwrap().push(args.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("database gone away".to_string()));
        }

        let records = self.records.lock().unwrap();
        let empty = Vec::new();
        let matching: Vec<&StoredRecord> = records
            .get(scope)
            .unwrap_or(&empty)
            .iter()
            .filter(|r| args.include.is_empty() || args.include.contains(&r.id))
            .filter(|r| args.lower_id.map_or(true, |l| r.id >= l))
            .filter(|r| args.upper_id.map_or(true, |u| r.id <= u))
            .collect();

        let objects = matching
            .iter()
            .filter(|r| args.resume_after_id.map_or(true, |after| r.id > after))
            .skip(args.offset as usize)
            .take(args.per_page)
            .map(|r| (*r).clone())
            .collect();

        Ok(QueryPage {
            objects,
            total_objects: matching.len() as u64,
        })
    }
}

/// What the scripted sink does on its next call.
#[derive(Debug, Clone)]
pub enum SinkScript {
    Ok,
    FailIds(Vec<ObjectId>),
    Transport(String),
}

/// Sink replaying a script of outcomes, then succeeding.
#[derive(Default)]
pub struct ScriptedSink {
    script: Mutex<VecDeque<SinkScript>>,
    always: Mutex<Option<SinkScript>>,
    calls: AtomicUsize,
    indexed: Mutex<Vec<ObjectId>>,
}

impl ScriptedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, step: SinkScript) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn always(self, step: SinkScript) -> Self {
        *self.always.lock().unwrap() = Some(step);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn indexed(&self) -> Vec<ObjectId> {
        self.indexed.lock().unwrap().clone()
    }

    fn next(&self) -> SinkScript {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            return step;
        }
        self.always.lock().unwrap().clone().unwrap_or(SinkScript::Ok)
    }

    fn outcome(&self, ids: &[ObjectId], step: SinkScript) -> Result<BulkResponse, TransportError> {
        match step {
            SinkScript::Transport(message) => Err(TransportError::new(message)),
            SinkScript::FailIds(failing) => {
                let items = ids
                    .iter()
                    .map(|id| {
                        if failing.contains(id) {
                            let error = ItemError::new("mapper_parsing_exception", "bad field");
                            BulkItem::failed(*id, error)
                        } else {
                            self.indexed.lock().unwrap().push(*id);
                            BulkItem::ok(*id)
                        }
                    })
                    .collect();
                Ok(BulkResponse::from_items(items))
            }
            SinkScript::Ok => {
                self.indexed.lock().unwrap().extend_from_slice(ids);
                Ok(BulkResponse::from_items(ids.iter().map(|id| BulkItem::ok(*id)).collect()))
            }
        }
    }
}

impl BulkSink for ScriptedSink {
    fn bulk_index(&self, _scope: &Scope, ids: &[ObjectId]) -> Result<BulkResponse, TransportError> {
        let step = self.next();
        self.outcome(ids, step)
    }

    fn index(
        &self,
        _scope: &Scope,
        id: ObjectId,
        _blocking: bool,
    ) -> Result<IndexResponse, TransportError> {
        let step = self.next();
        let response = self.outcome(&[id], step)?;
        Ok(IndexResponse {
            error: response.items.into_iter().next().and_then(|item| item.error),
        })
    }
}

/// Admin recording every call.
pub struct RecordingAdmin {
    pub mapping_ok: bool,
    pub alias_ok: bool,
    pub deleted: Mutex<Vec<Scope>>,
    pub mappings: Mutex<Vec<Scope>>,
    pub aliases: Mutex<Vec<(ContentKind, Vec<String>)>>,
}

impl RecordingAdmin {
    pub fn new() -> Self {
        Self {
            mapping_ok: true,
            alias_ok: true,
            deleted: Mutex::new(Vec::new()),
            mappings: Mutex::new(Vec::new()),
            aliases: Mutex::new(Vec::new()),
        }
    }
}

impl IndexAdmin for RecordingAdmin {
    fn delete_index(&self, scope: &Scope) -> bool {
        self.deleted.lock().unwrap().push(scope.clone());
        true
    }

    fn put_mapping(&self, scope: &Scope) -> bool {
        self.mappings.lock().unwrap().push(scope.clone());
        self.mapping_ok
    }

    fn index_name(&self, scope: &Scope) -> String {
        match scope.tenant {
            Some(tenant) => format!("idx-{}-{}", tenant, scope.kind),
            None => format!("idx-global-{}", scope.kind),
        }
    }

    fn create_alias(&self, kind: &ContentKind, index_names: &[String]) -> bool {
        self.aliases
            .lock()
            .unwrap()
            .push((kind.clone(), index_names.to_vec()));
        self.alias_ok
    }
}

/// Collaborators shared by every kind of a test registry.
pub struct Fixture {
    pub source: Arc<VecSource>,
    pub sink: Arc<ScriptedSink>,
    pub admin: Arc<RecordingAdmin>,
}

impl Fixture {
    pub fn new(sink: ScriptedSink) -> Self {
        Self {
            source: Arc::new(VecSource::new()),
            sink: Arc::new(sink),
            admin: Arc::new(RecordingAdmin::new()),
        }
    }

    pub fn with_admin(mut self, admin: RecordingAdmin) -> Self {
        self.admin = Arc::new(admin);
        self
    }

    /// Registry with post and term (tenant-scoped) and user (global).
    pub fn registry(&self) -> ContentKindRegistry {
        let kinds = [
            ContentKindSettings::new("post", "Post", "Posts"),
            ContentKindSettings::new("term", "Term", "Terms"),
            ContentKindSettings::new("user", "User", "Users").global(),
        ];
        let mut registry = ContentKindRegistry::new();
        for kind in kinds {
            registry.register(
                kind,
                self.source.clone(),
                self.sink.clone(),
                self.admin.clone(),
            );
        }
        registry
    }

    /// Registry with only the given kinds (tenant-scoped).
    pub fn registry_of(&self, kinds: &[(&str, &str, &str)]) -> ContentKindRegistry {
        let mut registry = ContentKindRegistry::new();
        for (slug, singular, plural) in kinds {
            registry.register(
                ContentKindSettings::new(slug, singular, plural),
                self.source.clone(),
                self.sink.clone(),
                self.admin.clone(),
            );
        }
        registry
    }
}

pub fn posts(tenant: u64) -> Scope {
    Scope::tenant(TenantId(tenant), ContentKind::new("post"))
}

pub fn terms(tenant: u64) -> Scope {
    Scope::tenant(TenantId(tenant), ContentKind::new("term"))
}
