//! Source records fed through the sync pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncTypesError;
use crate::scope::{ContentKind, ObjectId, Scope, TenantId};

/// A record as held by the source store.
///
/// Records are the unit the source adapters page over and the bulk sink
/// turns into search documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Record ID, unique within its scope
    pub id: ObjectId,

    /// Owning tenant (None for tenant-global kinds)
    #[serde(default)]
    pub tenant: Option<TenantId>,

    /// Content kind slug
    pub kind: ContentKind,

    /// Optional sub-type used for content-type filtering (e.g. "page")
    #[serde(default)]
    pub subtype: Option<String>,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Main text body
    #[serde(default)]
    pub body: String,

    /// Free-form extra fields carried into the document unchanged
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,

    /// Last modification time (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Create a record with the given identity and title.
    pub fn new(scope: &Scope, id: ObjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            tenant: scope.tenant,
            kind: scope.kind.clone(),
            subtype: None,
            title: title.into(),
            body: String::new(),
            fields: BTreeMap::new(),
            modified_at: Utc::now(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Scope this record belongs to.
    pub fn scope(&self) -> Scope {
        Scope {
            tenant: self.tenant,
            kind: self.kind.clone(),
        }
    }

    /// Whether the record has any text a search document can be built from.
    pub fn has_indexable_text(&self) -> bool {
        !self.title.trim().is_empty() || !self.body.trim().is_empty()
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncTypesError> {
        serde_json::to_vec(self).map_err(SyncTypesError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncTypesError> {
        serde_json::from_slice(bytes).map_err(SyncTypesError::from)
    }
}
