//! Record indexer for one destination index.
//!
//! Documents are not visible until commit() is called.

use std::sync::Mutex;

use tantivy::{IndexWriter, Term};
use tracing::{debug, warn};

use sync_types::StoredRecord;

use crate::document::record_to_doc;
use crate::error::SearchError;
use crate::index::RecordIndex;
use crate::schema::RecordSchema;

/// Upserts records into one index.
pub struct RecordIndexer {
    writer: Mutex<IndexWriter>,
    schema: RecordSchema,
}

impl RecordIndexer {
    /// Create a new indexer holding the index's writer lock.
    pub fn new(index: &RecordIndex) -> Result<Self, SearchError> {
        Ok(Self {
            writer: Mutex::new(index.writer()?),
            schema: index.schema().clone(),
        })
    }

    /// Index a record, replacing any document with the same ID.
    pub fn upsert(&self, record: &StoredRecord) -> Result<(), SearchError> {
        let doc = record_to_doc(&self.schema, record)?;

        let writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        writer.delete_term(Term::from_field_u64(self.schema.id, record.id));
        writer.add_document(doc)?;

        debug!(id = record.id, kind = %record.kind, "Indexed record");
        Ok(())
    }

    /// Commit pending changes to make them searchable.
    pub fn commit(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.commit()?;
        debug!(opstamp, "Committed index changes");
        Ok(opstamp)
    }

    /// Rollback uncommitted changes.
    pub fn rollback(&self) -> Result<u64, SearchError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        let opstamp = writer.rollback()?;
        warn!(opstamp, "Rolled back index changes");
        Ok(opstamp)
    }
}
