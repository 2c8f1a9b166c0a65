//! Storage layer for bulk-sync.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for checkpoints and source records
//! - Scope-prefixed record keys ordered by record ID for range scans
//! - Whole-value checkpoint reads and writes for crash recovery

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{RecordPage, RecordQuery, Storage, StorageStats};
pub use error::StorageError;
pub use keys::{CheckpointKey, RecordKey};
