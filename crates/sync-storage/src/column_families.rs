//! Column family definitions for RocksDB.
//!
//! - checkpoints: sync job checkpoint and last-sync report (default compaction)
//! - records: source records keyed by scope and ID (compressed)

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family for the sync checkpoint and related option values
pub const CF_CHECKPOINTS: &str = "checkpoints";

/// Column family for source records
pub const CF_RECORDS: &str = "records";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_CHECKPOINTS, CF_RECORDS];

fn records_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_CHECKPOINTS, Options::default()),
        ColumnFamilyDescriptor::new(CF_RECORDS, records_options()),
    ]
}
