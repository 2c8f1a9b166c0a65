//! Bulk sink and index admin over the Tantivy index catalog.
//!
//! Each call opens the scope's index, upserts the resolved records and
//! commits before returning, so an acknowledged record is searchable.

use std::sync::Arc;

use tracing::{debug, warn};

use sync_search::{AliasManifest, IndexCatalog, RecordIndexer, SearchError};
use sync_types::{ContentKind, ObjectId, Scope, StoredRecord};

use crate::sink::{
    BulkItem, BulkResponse, BulkSink, IndexAdmin, IndexResponse, ItemError, TransportError,
};
use crate::storage_source::StorageSource;

pub const DOCUMENT_MISSING: &str = "document_missing_exception";
pub const ILLEGAL_ARGUMENT: &str = "illegal_argument_exception";
pub const MAPPER_PARSING: &str = "mapper_parsing_exception";

pub struct SearchSink {
    catalog: IndexCatalog,
    source: Arc<StorageSource>,
}

impl SearchSink {
    pub fn new(catalog: IndexCatalog, source: Arc<StorageSource>) -> Self {
        Self { catalog, source }
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }

    /// Resolve a record, or the per-item error that rejects it.
    fn resolve(
        &self,
        scope: &Scope,
        id: ObjectId,
    ) -> Result<Result<StoredRecord, ItemError>, TransportError> {
        let record = self
            .source
            .get_record(scope, id)
            .map_err(|e| TransportError::new(e.to_string()))?;

        Ok(match record {
            None => Err(ItemError::new(
                DOCUMENT_MISSING,
                format!("record {} not found in {}", id, scope),
            )),
            Some(record) if !record.has_indexable_text() => Err(ItemError::new(
                ILLEGAL_ARGUMENT,
                "record has no indexable text",
            )),
            Some(record) => Ok(record),
        })
    }

    fn write(&self, scope: &Scope, ids: &[ObjectId]) -> Result<Vec<BulkItem>, TransportError> {
        let index = self.catalog.open_or_create(scope).map_err(transport)?;
        let indexer = RecordIndexer::new(&index).map_err(transport)?;

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let item = match self.resolve(scope, *id)? {
                Err(error) => BulkItem::failed(*id, error),
                Ok(record) => match indexer.upsert(&record) {
                    Ok(()) => BulkItem::ok(*id),
                    Err(SearchError::Serialization(reason)) => {
                        BulkItem::failed(*id, ItemError::new(MAPPER_PARSING, reason))
                    }
                    Err(e) => {
                        if let Err(rollback) = indexer.rollback() {
                            warn!(scope = %scope, error = %rollback, "Failed to roll back batch");
                        }
                        return Err(transport(e));
                    }
                },
            };
            items.push(item);
        }

        let opstamp = indexer.commit().map_err(transport)?;
        debug!(scope = %scope, count = items.len(), opstamp, "Wrote batch to index");
        Ok(items)
    }
}

fn transport(err: SearchError) -> TransportError {
    TransportError::new(err.to_string())
}

impl BulkSink for SearchSink {
    fn bulk_index(&self, scope: &Scope, ids: &[ObjectId]) -> Result<BulkResponse, TransportError> {
        self.write(scope, ids).map(BulkResponse::from_items)
    }

    // Every write commits, so `blocking` needs no extra work.
    fn index(
        &self,
        scope: &Scope,
        id: ObjectId,
        _blocking: bool,
    ) -> Result<IndexResponse, TransportError> {
        let items = self.write(scope, &[id])?;
        Ok(IndexResponse {
            error: items.into_iter().next().and_then(|item| item.error),
        })
    }
}

impl IndexAdmin for SearchSink {
    fn delete_index(&self, scope: &Scope) -> bool {
        match self.catalog.delete(scope) {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Failed to delete index");
                false
            }
        }
    }

    fn put_mapping(&self, scope: &Scope) -> bool {
        match self.catalog.open_or_create(scope) {
            Ok(_) => true,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Failed to create index");
                false
            }
        }
    }

    fn index_name(&self, scope: &Scope) -> String {
        self.catalog.index_name(scope)
    }

    fn create_alias(&self, kind: &ContentKind, index_names: &[String]) -> bool {
        let alias = self.catalog.alias_name(kind);
        match AliasManifest::put_alias(self.catalog.root(), &alias, index_names) {
            Ok(()) => true,
            Err(e) => {
                warn!(alias = %alias, error = %e, "Failed to write alias");
                false
            }
        }
    }
}
