//! # sync-search
//!
//! Destination indexes for bulk-sync, backed by Tantivy.
//!
//! ## Features
//! - One embedded index per (tenant, content kind), named from a prefix
//! - Record schema with the record ID as upsert key
//! - Upsert indexing that replaces documents with the same ID
//! - Alias manifest grouping per-tenant indexes under one network alias

pub mod alias;
pub mod document;
pub mod error;
pub mod index;
pub mod indexer;
pub mod schema;

pub use alias::AliasManifest;
pub use document::record_to_doc;
pub use error::SearchError;
pub use index::{IndexCatalog, RecordIndex, SearchIndexConfig};
pub use indexer::RecordIndexer;
pub use schema::{build_record_schema, RecordSchema};
