//! RocksDB wrapper for bulk-sync storage.
//!
//! Provides:
//! - Database open with column family setup
//! - Whole-value checkpoint get/put/delete
//! - Record writes and scope-bounded range reads

use std::path::Path;

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use sync_types::{ObjectId, Scope, StoredRecord};

use crate::column_families::{build_cf_descriptors, ALL_CF_NAMES, CF_CHECKPOINTS, CF_RECORDS};
use crate::error::StorageError;
use crate::keys::{CheckpointKey, RecordKey};

/// Filter and pagination for a record query within one scope.
///
/// Records come back in ascending ID order. `total` in the resulting page
/// counts every record matching `include`, `subtypes` and the ID bounds,
/// ignoring `after`, `offset` and `limit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Only these IDs (empty = no restriction)
    pub include: Vec<ObjectId>,
    /// Only records with one of these subtypes (empty = no restriction)
    pub subtypes: Vec<String>,
    /// Inclusive lower ID bound
    pub lower: Option<ObjectId>,
    /// Inclusive upper ID bound
    pub upper: Option<ObjectId>,
    /// Exclusive resume point: only IDs greater than this are returned
    pub after: Option<ObjectId>,
    /// Matching records to skip before collecting
    pub offset: usize,
    /// Maximum records to return
    pub limit: usize,
}

impl RecordQuery {
    fn in_bounds(&self, id: ObjectId) -> bool {
        self.lower.map_or(true, |lower| id >= lower) && self.upper.map_or(true, |upper| id <= upper)
    }

    fn matches(&self, record: &StoredRecord) -> bool {
        if !self.include.is_empty() && !self.include.contains(&record.id) {
            return false;
        }
        if !self.subtypes.is_empty() {
            match &record.subtype {
                Some(subtype) if self.subtypes.iter().any(|s| s == subtype) => {}
                _ => return false,
            }
        }
        self.in_bounds(record.id)
    }

    fn past_resume_point(&self, id: ObjectId) -> bool {
        self.after.map_or(true, |after| id > after)
    }

    /// Smallest ID a page can contain.
    fn first_id(&self) -> Option<ObjectId> {
        let resume = self.after.map(|after| after.saturating_add(1));
        match (self.lower, resume) {
            (Some(lower), Some(resume)) => Some(lower.max(resume)),
            (lower, resume) => lower.or(resume),
        }
    }
}

/// A page of records plus the total matching count.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    pub total: u64,
}

/// Main storage interface for bulk-sync
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ==================== Checkpoint Methods ====================

    /// Store a checkpoint value, replacing any previous value
    pub fn put_checkpoint(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        self.db.put_cf(cf, CheckpointKey::new(name).to_bytes(), bytes)?;
        debug!(name, len = bytes.len(), "Stored checkpoint");
        Ok(())
    }

    /// Get a checkpoint value
    pub fn get_checkpoint(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        Ok(self.db.get_cf(cf, CheckpointKey::new(name).to_bytes())?)
    }

    /// Delete a checkpoint value. Deleting a missing key is not an error.
    pub fn delete_checkpoint(&self, name: &str) -> Result<(), StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        self.db.delete_cf(cf, CheckpointKey::new(name).to_bytes())?;
        debug!(name, "Deleted checkpoint");
        Ok(())
    }

    // ==================== Record Methods ====================

    /// Store a record, replacing any record with the same scope and ID
    pub fn put_record(&self, record: &StoredRecord) -> Result<(), StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let key = RecordKey::new(record.scope(), record.id);
        self.db.put_cf(cf, key.to_bytes(), record.to_bytes()?)?;
        Ok(())
    }

    /// Store many records in one atomic write
    pub fn put_records(&self, records: &[StoredRecord]) -> Result<usize, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let mut batch = WriteBatch::default();
        for record in records {
            let key = RecordKey::new(record.scope(), record.id);
            batch.put_cf(cf, key.to_bytes(), record.to_bytes()?);
        }
        self.db.write(batch)?;
        debug!(count = records.len(), "Stored records batch");
        Ok(records.len())
    }

    /// Get a record by scope and ID
    pub fn get_record(
        &self,
        scope: &Scope,
        id: ObjectId,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let key = RecordKey::new(scope.clone(), id);
        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(StoredRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a record by scope and ID
    pub fn delete_record(&self, scope: &Scope, id: ObjectId) -> Result<(), StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        self.db
            .delete_cf(cf, RecordKey::new(scope.clone(), id).to_bytes())?;
        Ok(())
    }

    /// Query one scope's records.
    ///
    /// The page scan seeks to the resume point and stops at `limit`; the total
    /// is counted from keys alone unless a subtype filter needs the values.
    pub fn query_records(
        &self,
        scope: &Scope,
        query: &RecordQuery,
    ) -> Result<RecordPage, StorageError> {
        if !query.include.is_empty() {
            return self.query_included(scope, query);
        }

        let page = RecordPage {
            total: self.count_matching(scope, query)?,
            records: self.collect_page(scope, query)?,
        };

        debug!(
            scope = %scope,
            total = page.total,
            returned = page.records.len(),
            "Queried records"
        );
        Ok(page)
    }

    fn count_matching(&self, scope: &Scope, query: &RecordQuery) -> Result<u64, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let prefix = RecordKey::scope_prefix(scope);
        let start = match query.lower {
            Some(lower) => RecordKey::new(scope.clone(), lower).to_bytes(),
            None => prefix.clone(),
        };

        let mut total = 0u64;
        let mut iter = self.db.raw_iterator_cf(cf);
        iter.seek(&start);
        while iter.valid() {
            let Some(key) = iter.key() else {
                break;
            };
            if !key.starts_with(&prefix) {
                break;
            }
            let id = RecordKey::from_bytes(key)?.id;
            if query.upper.is_some_and(|upper| id > upper) {
                break;
            }

            if query.subtypes.is_empty() {
                total += 1;
            } else if let Some(value) = iter.value() {
                if query.matches(&StoredRecord::from_bytes(value)?) {
                    total += 1;
                }
            }
            iter.next();
        }
        iter.status()?;
        Ok(total)
    }

    fn collect_page(
        &self,
        scope: &Scope,
        query: &RecordQuery,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let mut records = Vec::with_capacity(query.limit.min(1024));
        if query.limit == 0 {
            return Ok(records);
        }

        let cf = self.cf(CF_RECORDS)?;
        let prefix = RecordKey::scope_prefix(scope);
        let start = match query.first_id() {
            Some(id) => RecordKey::new(scope.clone(), id).to_bytes(),
            None => prefix.clone(),
        };
        let mut skipped = 0usize;

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record_key = RecordKey::from_bytes(&key)?;
            if query.upper.is_some_and(|upper| record_key.id > upper) {
                break;
            }
            if !query.past_resume_point(record_key.id) {
                continue;
            }

            // Without a subtype filter every key in range matches
            let filtered = if query.subtypes.is_empty() {
                None
            } else {
                let record = StoredRecord::from_bytes(&value)?;
                if !query.matches(&record) {
                    continue;
                }
                Some(record)
            };
            if skipped < query.offset {
                skipped += 1;
                continue;
            }

            let record = match filtered {
                Some(record) => record,
                None => StoredRecord::from_bytes(&value)?,
            };
            records.push(record);
            if records.len() >= query.limit {
                break;
            }
        }
        Ok(records)
    }

    fn query_included(
        &self,
        scope: &Scope,
        query: &RecordQuery,
    ) -> Result<RecordPage, StorageError> {
        let mut ids = query.include.clone();
        ids.sort_unstable();
        ids.dedup();

        let mut page = RecordPage::default();
        let mut skipped = 0usize;

        for id in ids {
            let Some(record) = self.get_record(scope, id)? else {
                continue;
            };
            if !query.matches(&record) {
                continue;
            }
            page.total += 1;

            if !query.past_resume_point(record.id) {
                continue;
            }
            if skipped < query.offset {
                skipped += 1;
                continue;
            }
            if page.records.len() < query.limit {
                page.records.push(record);
            }
        }
        Ok(page)
    }

    // ===== Admin Operations =====

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();

        if let Some(cf) = self.db.cf_handle(CF_RECORDS) {
            stats.record_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_CHECKPOINTS) {
            stats.checkpoint_count = self.count_cf_entries(cf)?;
        }

        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                if let Ok(Some(size)) = self
                    .db
                    .property_int_value_cf(cf, "rocksdb.estimate-live-data-size")
                {
                    stats.disk_usage_bytes += size;
                }
            }
        }

        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &rocksdb::ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

/// Database statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Number of source records stored
    pub record_count: u64,
    /// Number of checkpoint and option values
    pub checkpoint_count: u64,
    /// Estimated live data size in bytes
    pub disk_usage_bytes: u64,
}
