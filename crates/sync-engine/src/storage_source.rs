//! Source adapter over RocksDB-stored records.
//!
//! Records fetched by a query are kept in a bounded LRU cache so the bulk
//! sink can resolve the IDs of the same batch without a second read. The
//! cache is a `StepCache` and is emptied after every step.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use sync_storage::{RecordQuery, Storage, StorageError};
use sync_types::{ObjectId, Scope, StoredRecord};

use crate::context::StepCache;
use crate::source::{QueryArgs, QueryPage, SourceAdapter, SourceError};

/// Default number of cached records
pub const DEFAULT_CACHE_SIZE: usize = 1024;

pub struct StorageSource {
    storage: Arc<Storage>,
    cache: Mutex<LruCache<(Scope, ObjectId), StoredRecord>>,
}

impl StorageSource {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self::with_cache_size(storage, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(storage: Arc<Storage>, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            storage,
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Look a record up, cache first.
    pub fn get_record(
        &self,
        scope: &Scope,
        id: ObjectId,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let key = (scope.clone(), id);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(record) = cache.get(&key) {
                return Ok(Some(record.clone()));
            }
        }

        let record = self.storage.get_record(scope, id)?;
        if let (Some(record), Ok(mut cache)) = (&record, self.cache.lock()) {
            cache.put(key, record.clone());
        }
        Ok(record)
    }

    /// Number of cached records
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn to_record_query(args: &QueryArgs) -> RecordQuery {
        RecordQuery {
            include: args.include.clone(),
            subtypes: args.content_types.clone(),
            lower: args.lower_id,
            upper: args.upper_id,
            after: args.resume_after_id,
            offset: args.offset as usize,
            limit: args.per_page,
        }
    }
}

impl SourceAdapter for StorageSource {
    fn query(&self, scope: &Scope, args: &QueryArgs) -> Result<QueryPage, SourceError> {
        let page = self
            .storage
            .query_records(scope, &Self::to_record_query(args))
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        if let Ok(mut cache) = self.cache.lock() {
            for record in &page.records {
                cache.put((scope.clone(), record.id), record.clone());
            }
        }
        debug!(
            scope = %scope,
            fetched = page.records.len(),
            total = page.total,
            "Queried stored records"
        );

        Ok(QueryPage {
            objects: page.records,
            total_objects: page.total,
        })
    }
}

impl StepCache for StorageSource {
    fn reset(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn name(&self) -> &str {
        "storage_source"
    }
}
