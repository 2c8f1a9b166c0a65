//! End-to-end test infrastructure for bulk-sync.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the full store-to-index sync pipeline over real RocksDB
//! and Tantivy directories.

use std::sync::Arc;

use sync_engine::{
    ConfiguredTenants, ContentKindRegistry, MemoryProgressSink, SearchSink, StorageSource,
    SyncConfig, SyncOrchestrator,
};
use sync_search::{AliasManifest, IndexCatalog, SearchIndexConfig};
use sync_storage::Storage;
use sync_types::{ContentKind, ObjectId, Scope, Settings, StoredRecord, TenantId, TenantSettings};

/// Index name prefix used by every harness
pub const TEST_PREFIX: &str = "e2e";

/// Shared test harness for E2E tests.
///
/// Owns the storage, search catalog and collaborators. Every call to
/// [`TestHarness::orchestrator`] returns a fresh orchestrator over the same
/// directories, which is how tests simulate separate processes.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Shared storage instance (records and checkpoints)
    pub storage: Arc<Storage>,
    pub source: Arc<StorageSource>,
    pub sink: Arc<SearchSink>,
    /// Messages of every orchestrator built by this harness
    pub progress: Arc<MemoryProgressSink>,
    pub settings: Settings,
}

impl TestHarness {
    /// Single-tenant harness with the default content kinds.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Multi-tenant harness over tenants `1..=count`.
    pub fn network(count: u64) -> Self {
        let mut settings = Settings::default();
        settings.network = true;
        settings.tenants = (1..=count).map(TenantSettings::new).collect();
        Self::with_settings(settings)
    }

    pub fn with_settings(mut settings: Settings) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("db");
        let index_path = temp_dir.path().join("search");
        std::fs::create_dir_all(&index_path).expect("Failed to create search index dir");

        settings.db_path = db_path.to_string_lossy().to_string();
        settings.search_index_path = index_path.to_string_lossy().to_string();
        settings.index_prefix = TEST_PREFIX.to_string();

        let storage = Arc::new(Storage::open(&db_path).expect("Failed to open test storage"));
        let source = Arc::new(StorageSource::new(storage.clone()));
        let catalog = IndexCatalog::new(SearchIndexConfig::new(index_path, TEST_PREFIX));
        let sink = Arc::new(SearchSink::new(catalog, source.clone()));

        Self {
            _temp_dir: temp_dir,
            storage,
            source,
            sink,
            progress: Arc::new(MemoryProgressSink::new()),
            settings,
        }
    }

    /// A fresh orchestrator over the harness directories.
    pub fn orchestrator(&self) -> SyncOrchestrator {
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
        .with_progress(self.progress.clone())
        .with_cache(self.source.clone())
    }

    /// Store records with the given IDs and text in `scope`.
    pub fn seed(&self, scope: &Scope, ids: impl IntoIterator<Item = ObjectId>) {
        let records = create_records(scope, ids, "Indexed record");
        self.storage
            .put_records(&records)
            .expect("Failed to store records");
    }

    /// Documents in the index of `scope`.
    pub fn doc_count(&self, scope: &Scope) -> u64 {
        self.sink
            .catalog()
            .count_docs(scope)
            .expect("Failed to count documents")
    }

    /// Index names behind the network alias of `kind`.
    pub fn alias_targets(&self, kind: &str) -> Option<Vec<String>> {
        let catalog = self.sink.catalog();
        let manifest = AliasManifest::load(catalog.root()).expect("Failed to load aliases");
        manifest
            .get(&catalog.alias_name(&ContentKind::new(kind)))
            .map(|names| names.to_vec())
    }

    /// A stored report or other JSON checkpoint value.
    pub fn stored_json(&self, key: &str) -> Option<serde_json::Value> {
        let bytes = self
            .storage
            .get_checkpoint(key)
            .expect("Failed to read checkpoint")?;
        Some(serde_json::from_slice(&bytes).expect("Stored value is not JSON"))
    }

    /// Recorded progress message texts.
    pub fn messages(&self) -> Vec<String> {
        self.progress.texts()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Scope of a tenant-scoped kind.
pub fn tenant_scope(tenant: u64, kind: &str) -> Scope {
    Scope::tenant(TenantId(tenant), ContentKind::new(kind))
}

/// Scope of a global kind.
pub fn global_scope(kind: &str) -> Scope {
    Scope::global(ContentKind::new(kind))
}

/// Create records for `ids`, titled with the ID appended to `base_text`.
pub fn create_records(
    scope: &Scope,
    ids: impl IntoIterator<Item = ObjectId>,
    base_text: &str,
) -> Vec<StoredRecord> {
    ids.into_iter()
        .map(|id| {
            StoredRecord::new(scope, id, format!("{} {}", base_text, id))
                .with_body(format!("Body of {} {}", base_text, id))
        })
        .collect()
}
