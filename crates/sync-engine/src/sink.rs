//! Bulk sink and index admin interfaces.
//!
//! The bulk sink transforms records into documents and writes them to the
//! destination. Index admin covers the mapping and alias capabilities of the
//! destination.

use thiserror::Error;

use sync_types::{ContentKind, ObjectId, Scope};

/// Per-item failure reported by the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    /// Error type, e.g. "illegal_argument_exception"
    pub error_type: String,
    pub reason: String,
}

impl ItemError {
    pub fn new(error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome for one item of a bulk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub id: ObjectId,
    pub error: Option<ItemError>,
}

impl BulkItem {
    pub fn ok(id: ObjectId) -> Self {
        Self { id, error: None }
    }

    pub fn failed(id: ObjectId, error: ItemError) -> Self {
        Self {
            id,
            error: Some(error),
        }
    }
}

/// Response of a bulk call that reached the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    /// At least one item failed
    pub errors: bool,
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Build a response, deriving `errors` from the items.
    pub fn from_items(items: Vec<BulkItem>) -> Self {
        Self {
            errors: items.iter().any(|item| item.error.is_some()),
            items,
        }
    }

    /// Items that carry an error.
    pub fn failed_items(&self) -> Vec<(ObjectId, ItemError)> {
        if !self.errors {
            return Vec::new();
        }
        self.items
            .iter()
            .filter_map(|item| item.error.clone().map(|error| (item.id, error)))
            .collect()
    }
}

/// Response of a single-record index call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexResponse {
    pub error: Option<ItemError>,
}

/// The destination could not be reached or refused the whole call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .messages.join("; "))]
pub struct TransportError {
    pub messages: Vec<String>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

/// Writes documents for records to the destination.
pub trait BulkSink: Send + Sync {
    /// Index a set of records in one call.
    fn bulk_index(&self, scope: &Scope, ids: &[ObjectId]) -> Result<BulkResponse, TransportError>;

    /// Index one record. `blocking` asks for the document to be visible on return.
    fn index(
        &self,
        scope: &Scope,
        id: ObjectId,
        blocking: bool,
    ) -> Result<IndexResponse, TransportError>;
}

/// Mapping and alias operations on the destination.
pub trait IndexAdmin: Send + Sync {
    /// Delete the scope's destination index. Returns false when nothing was deleted.
    fn delete_index(&self, scope: &Scope) -> bool;

    /// Create the scope's destination index from its schema.
    fn put_mapping(&self, scope: &Scope) -> bool;

    /// Destination index name of a scope.
    fn index_name(&self, scope: &Scope) -> String;

    /// Point the kind's network alias at the given indexes.
    fn create_alias(&self, kind: &ContentKind, index_names: &[String]) -> bool;
}
