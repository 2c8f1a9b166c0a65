//! Run arguments for a sync job.

use std::fmt;

use serde::{Deserialize, Serialize};

use sync_types::{ContentKind, ObjectId, TenantId};

/// Invocation channel of a job.
///
/// Opaque to the engine apart from naming the per-method last-sync report;
/// passed through to hooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// One command runs the job to completion
    Cli,
    /// Stepwise drivers advancing one unit of work per call
    #[default]
    Web,
}

impl SyncMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMethod::Cli => "cli",
            SyncMethod::Web => "web",
        }
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of one sync run.
///
/// Persisted inside the job so later steps, possibly from another process,
/// run with the arguments the job was built with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncArgs {
    #[serde(default)]
    pub method: SyncMethod,

    /// Delete and recreate each destination index before indexing it
    #[serde(default)]
    pub put_mapping: bool,

    /// Starting offset within the first work item
    #[serde(default)]
    pub offset: u64,

    /// Records per batch (overrides the configured default)
    #[serde(default)]
    pub per_page: Option<usize>,

    /// Index records one at a time instead of in bulk
    #[serde(default)]
    pub nobulk: bool,

    /// Only these record IDs
    #[serde(default)]
    pub include: Vec<ObjectId>,

    /// Only these content kinds (empty = all registered kinds)
    #[serde(default)]
    pub kinds: Vec<ContentKind>,

    /// Record subtypes passed through to the source query
    #[serde(default)]
    pub content_types: Vec<String>,

    /// Inclusive lower record ID bound
    #[serde(default)]
    pub lower_id: Option<ObjectId>,

    /// Inclusive upper record ID bound
    #[serde(default)]
    pub upper_id: Option<ObjectId>,

    /// Page by last processed ID (overrides the configured default)
    #[serde(default)]
    pub advanced_pagination: Option<bool>,

    /// Delivery attempts per batch (overrides the configured default)
    #[serde(default)]
    pub total_attempts: Option<u32>,

    /// Multi-tenant mode: only the first N tenants
    #[serde(default)]
    pub network_wide: Option<usize>,

    /// Single-tenant mode: the tenant to index instead of the default one
    #[serde(default)]
    pub tenant: Option<TenantId>,
}

impl SyncArgs {
    pub fn new(method: SyncMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_put_mapping(mut self, put_mapping: bool) -> Self {
        self.put_mapping = put_mapping;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn with_nobulk(mut self, nobulk: bool) -> Self {
        self.nobulk = nobulk;
        self
    }

    pub fn with_include(mut self, ids: Vec<ObjectId>) -> Self {
        self.include = ids;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<ContentKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_content_types(mut self, content_types: Vec<String>) -> Self {
        self.content_types = content_types;
        self
    }

    pub fn with_id_bounds(mut self, lower: Option<ObjectId>, upper: Option<ObjectId>) -> Self {
        self.lower_id = lower;
        self.upper_id = upper;
        self
    }

    pub fn with_advanced_pagination(mut self, enabled: bool) -> Self {
        self.advanced_pagination = Some(enabled);
        self
    }

    pub fn with_total_attempts(mut self, attempts: u32) -> Self {
        self.total_attempts = Some(attempts);
        self
    }

    pub fn with_network_wide(mut self, limit: usize) -> Self {
        self.network_wide = Some(limit);
        self
    }

    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Page size after applying overrides: an explicit value replaces the
    /// default, no-bulk forces 1 and an include list forces its length.
    pub fn resolve_per_page(&self, default: usize) -> usize {
        let mut per_page = default;
        if let Some(explicit) = self.per_page.filter(|n| *n > 0) {
            per_page = explicit;
        }
        if self.nobulk {
            per_page = 1;
        }
        if !self.include.is_empty() {
            per_page = self.include.len();
        }
        per_page.max(1)
    }

    /// Whether a content kind passes the kind filter.
    pub fn includes_kind(&self, kind: &ContentKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(kind)
    }
}
