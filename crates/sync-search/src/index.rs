//! Tantivy index management.
//!
//! Each (tenant, content kind) pair gets its own index directory under a
//! common root. Index names follow `{prefix}-{tenant}-{kind}` for
//! tenant-scoped kinds and `{prefix}-global-{kind}` for global kinds.

use std::path::{Path, PathBuf};

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info};

use sync_types::{ContentKind, Scope};

use crate::error::SearchError;
use crate::schema::{build_record_schema, RecordSchema};

/// Default memory budget for IndexWriter (50MB)
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Search index configuration
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Directory holding all index directories and the alias manifest
    pub root: PathBuf,
    /// Prefix for index and alias names
    pub prefix: String,
    /// Memory budget for writer in MB
    pub writer_memory_mb: usize,
}

impl SearchIndexConfig {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }
}

/// Wrapper for one Tantivy index with schema access.
pub struct RecordIndex {
    index: Index,
    schema: RecordSchema,
    path: PathBuf,
    writer_memory_mb: usize,
}

impl RecordIndex {
    /// Get the record schema
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Get the underlying Tantivy index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Create a single-threaded IndexWriter with the configured memory budget
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let memory_budget = self.writer_memory_mb * 1024 * 1024;
        let writer: IndexWriter = self
            .index
            .writer_with_num_threads(1, memory_budget)
            .map_err(|e| match e {
                tantivy::TantivyError::LockFailure(..) => {
                    SearchError::IndexLocked(self.path.display().to_string())
                }
                other => SearchError::from(other),
            })?;
        debug!(path = ?self.path, memory_mb = self.writer_memory_mb, "Created index writer");
        Ok(writer)
    }

    /// Create an IndexReader that only reloads when asked
    pub fn reader(&self) -> Result<IndexReader, SearchError> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(reader)
    }

    /// Number of live documents as of the last commit
    pub fn num_docs(&self) -> Result<u64, SearchError> {
        Ok(self.reader()?.searcher().num_docs())
    }

    /// Get the index path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The set of destination indexes below one root directory.
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    config: SearchIndexConfig,
}

impl IndexCatalog {
    pub fn new(config: SearchIndexConfig) -> Self {
        Self { config }
    }

    /// Root directory of the catalog
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Destination index name for a scope
    pub fn index_name(&self, scope: &Scope) -> String {
        match scope.tenant {
            Some(tenant) => format!("{}-{}-{}", self.config.prefix, tenant, scope.kind),
            None => format!("{}-global-{}", self.config.prefix, scope.kind),
        }
    }

    /// Network alias name grouping every tenant's index of a kind
    pub fn alias_name(&self, kind: &ContentKind) -> String {
        format!("{}-{}-global", self.config.prefix, kind)
    }

    /// Directory of a named index
    pub fn index_path(&self, name: &str) -> Result<PathBuf, SearchError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(SearchError::InvalidName(name.to_string()));
        }
        Ok(self.config.root.join(name))
    }

    /// Whether an index exists for the scope
    pub fn exists(&self, scope: &Scope) -> bool {
        self.index_path(&self.index_name(scope))
            .map(|path| path.join("meta.json").exists())
            .unwrap_or(false)
    }

    /// Open the scope's index, creating it with the record schema if missing.
    pub fn open_or_create(&self, scope: &Scope) -> Result<RecordIndex, SearchError> {
        let path = self.index_path(&self.index_name(scope))?;

        let index = if path.join("meta.json").exists() {
            debug!(path = ?path, "Opening existing index");
            Index::open_in_dir(&path)?
        } else {
            info!(path = ?path, "Creating new index");
            std::fs::create_dir_all(&path)?;
            Index::create_in_dir(&path, build_record_schema().schema().clone())?
        };
        let schema = RecordSchema::from_schema(index.schema())?;

        Ok(RecordIndex {
            index,
            schema,
            path,
            writer_memory_mb: self.config.writer_memory_mb,
        })
    }

    /// Open the scope's index if it exists.
    pub fn open(&self, scope: &Scope) -> Result<RecordIndex, SearchError> {
        if !self.exists(scope) {
            return Err(SearchError::IndexNotFound(self.index_name(scope)));
        }
        self.open_or_create(scope)
    }

    /// Delete the scope's index. Returns false when there was nothing to delete.
    pub fn delete(&self, scope: &Scope) -> Result<bool, SearchError> {
        let path = self.index_path(&self.index_name(scope))?;
        if !path.exists() {
            debug!(path = ?path, "No index to delete");
            return Ok(false);
        }
        std::fs::remove_dir_all(&path)?;
        info!(path = ?path, "Deleted index");
        Ok(true)
    }

    /// Live document count of the scope's index, 0 when it does not exist.
    pub fn count_docs(&self, scope: &Scope) -> Result<u64, SearchError> {
        if !self.exists(scope) {
            return Ok(0);
        }
        self.open_or_create(scope)?.num_docs()
    }
}
