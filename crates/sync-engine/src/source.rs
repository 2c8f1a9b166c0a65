//! Source adapter interface.
//!
//! A source adapter pages over the records of one content kind. The engine
//! only sees records through this trait.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sync_types::{ObjectId, Scope, StoredRecord};

/// Errors a source adapter can report for a query.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing store could not be read
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// The query itself was rejected
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Pagination and filter arguments for one source query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryArgs {
    pub per_page: usize,
    pub offset: u64,
    /// Only these IDs (empty = no restriction)
    #[serde(default)]
    pub include: Vec<ObjectId>,
    /// Only records with one of these subtypes (empty = no restriction)
    #[serde(default)]
    pub content_types: Vec<String>,
    /// Inclusive lower ID bound
    #[serde(default)]
    pub lower_id: Option<ObjectId>,
    /// Inclusive upper ID bound
    #[serde(default)]
    pub upper_id: Option<ObjectId>,
    /// Exclusive resume point for advanced pagination
    #[serde(default)]
    pub resume_after_id: Option<ObjectId>,
}

/// One page of records plus the total match count.
///
/// `total_objects` counts every record matching the filters and ID bounds,
/// ignoring `resume_after_id`, `offset` and `per_page`.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub objects: Vec<StoredRecord>,
    pub total_objects: u64,
}

/// Pages over the records of a content kind.
pub trait SourceAdapter: Send + Sync {
    /// Fetch the page described by `args` within `scope`, in ascending ID order.
    fn query(&self, scope: &Scope, args: &QueryArgs) -> Result<QueryPage, SourceError>;
}
