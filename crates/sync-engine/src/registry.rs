//! Content kinds and tenants known to a run.

use std::sync::Arc;

use sync_types::{ContentKind, ContentKindSettings, Settings, TenantId, TenantSettings};

use crate::sink::{BulkSink, IndexAdmin};
use crate::source::SourceAdapter;

/// A content kind with the collaborators that read and write it.
#[derive(Clone)]
pub struct Indexable {
    pub settings: ContentKindSettings,
    pub source: Arc<dyn SourceAdapter>,
    pub sink: Arc<dyn BulkSink>,
    pub admin: Arc<dyn IndexAdmin>,
}

impl Indexable {
    pub fn slug(&self) -> &ContentKind {
        &self.settings.slug
    }

    pub fn is_global(&self) -> bool {
        self.settings.global
    }

    /// Singular label, as used in per-record error lines
    pub fn singular(&self) -> &str {
        &self.settings.singular
    }

    /// Lower-cased plural label, as used in progress messages
    pub fn plural_label(&self) -> String {
        self.settings.plural.to_lowercase()
    }
}

/// Registered content kinds, in registration order.
#[derive(Clone, Default)]
pub struct ContentKindRegistry {
    indexables: Vec<Indexable>,
}

impl ContentKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind. A later registration of the same slug replaces the earlier one.
    pub fn register(
        &mut self,
        settings: ContentKindSettings,
        source: Arc<dyn SourceAdapter>,
        sink: Arc<dyn BulkSink>,
        admin: Arc<dyn IndexAdmin>,
    ) {
        let indexable = Indexable {
            settings,
            source,
            sink,
            admin,
        };
        match self
            .indexables
            .iter_mut()
            .find(|existing| existing.slug() == indexable.slug())
        {
            Some(existing) => *existing = indexable,
            None => self.indexables.push(indexable),
        }
    }

    /// Builder-style `register`.
    pub fn with(
        mut self,
        settings: ContentKindSettings,
        source: Arc<dyn SourceAdapter>,
        sink: Arc<dyn BulkSink>,
        admin: Arc<dyn IndexAdmin>,
    ) -> Self {
        self.register(settings, source, sink, admin);
        self
    }

    /// Register every configured kind against the same collaborators.
    pub fn from_settings(
        kinds: &[ContentKindSettings],
        source: Arc<dyn SourceAdapter>,
        sink: Arc<dyn BulkSink>,
        admin: Arc<dyn IndexAdmin>,
    ) -> Self {
        let mut registry = Self::new();
        for kind in kinds {
            registry.register(kind.clone(), source.clone(), sink.clone(), admin.clone());
        }
        registry
    }

    pub fn get(&self, kind: &ContentKind) -> Option<&Indexable> {
        self.indexables.iter().find(|i| i.slug() == kind)
    }

    /// Kinds with the given global flag, in registration order.
    pub fn by_scope(&self, global: bool) -> impl Iterator<Item = &Indexable> {
        self.indexables.iter().filter(move |i| i.is_global() == global)
    }

    pub fn len(&self) -> usize {
        self.indexables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexables.is_empty()
    }
}

/// Enumerates the tenants of an installation.
pub trait TenantDirectory: Send + Sync {
    /// Tenants in stable enumeration order, at most `limit` when given.
    fn tenants(&self, limit: Option<usize>) -> Vec<TenantSettings>;

    /// The tenant single-tenant runs index.
    fn current(&self) -> Option<TenantSettings>;

    /// Look up one tenant.
    fn get(&self, id: TenantId) -> Option<TenantSettings> {
        self.tenants(None).into_iter().find(|t| t.id == id)
    }
}

/// Tenant directory backed by settings.
#[derive(Debug, Clone)]
pub struct ConfiguredTenants {
    tenants: Vec<TenantSettings>,
}

impl ConfiguredTenants {
    pub fn new(tenants: Vec<TenantSettings>) -> Self {
        Self { tenants }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.tenants.clone())
    }
}

impl TenantDirectory for ConfiguredTenants {
    fn tenants(&self, limit: Option<usize>) -> Vec<TenantSettings> {
        let limit = limit.filter(|n| *n > 0).unwrap_or(self.tenants.len());
        self.tenants.iter().take(limit).cloned().collect()
    }

    fn current(&self) -> Option<TenantSettings> {
        self.tenants.first().cloned()
    }
}
