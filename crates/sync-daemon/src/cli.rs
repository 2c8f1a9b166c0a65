//! CLI argument parsing for the sync daemon.
//!
//! CLI flags override all other configuration sources.

use clap::{Args, Parser, Subcommand};

use sync_engine::{SyncArgs, SyncMethod};
use sync_types::{ContentKind, ObjectId, TenantId};

/// Bulk Sync
///
/// Resumable, checkpointed bulk indexing of stored records into search indices.
#[derive(Parser, Debug)]
#[command(name = "sync-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/bulk-sync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load records from a JSON Lines file into the record store
    Ingest {
        /// File with one record per line
        path: String,

        /// Override database path
        #[arg(long)]
        db_path: Option<String>,
    },

    /// Run a sync to completion, resuming a stored job if there is one
    Index {
        /// Discard any stored job and start over
        #[arg(long)]
        fresh: bool,

        #[command(flatten)]
        args: IndexArgs,
    },

    /// Perform one unit of work, starting a job if none is stored
    Step {
        #[command(flatten)]
        args: IndexArgs,
    },

    /// Advance the stored job one step per tick until it completes
    Watch {
        /// Milliseconds to wait between steps (default from config)
        #[arg(long)]
        idle_ms: Option<u64>,

        #[command(flatten)]
        args: IndexArgs,
    },

    /// Show the running job or the last sync report
    Status,

    /// Discard the stored job
    Cancel,

    /// Check whether a content kind is being fully reindexed
    Reindexing {
        /// Content kind slug
        kind: String,

        /// Restrict the check to one tenant
        #[arg(long)]
        tenant: Option<u64>,
    },
}

/// Arguments of a new sync job. Ignored when a stored job is resumed.
#[derive(Args, Debug, Clone, Default)]
pub struct IndexArgs {
    /// Delete and recreate each index before filling it
    #[arg(long)]
    pub put_mapping: bool,

    /// Start the first item at this offset
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Records per batch
    #[arg(long)]
    pub per_page: Option<usize>,

    /// Send records one at a time instead of in bulk
    #[arg(long)]
    pub nobulk: bool,

    /// Only index these record IDs (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<ObjectId>,

    /// Only index these content kinds (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub kinds: Vec<String>,

    /// Only index records with these sub-types (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub content_types: Vec<String>,

    /// Lowest record ID to index
    #[arg(long)]
    pub lower_id: Option<ObjectId>,

    /// Highest record ID to index
    #[arg(long)]
    pub upper_id: Option<ObjectId>,

    /// Page by last processed ID instead of offset
    #[arg(long)]
    pub advanced_pagination: bool,

    /// Attempts per batch before giving up on it
    #[arg(long)]
    pub total_attempts: Option<u32>,

    /// Index at most this many tenants
    #[arg(long)]
    pub network_wide: Option<usize>,

    /// Index this tenant instead of the first configured one
    #[arg(long)]
    pub tenant: Option<u64>,
}

impl IndexArgs {
    /// Convert to engine arguments for the given driver.
    pub fn to_sync_args(&self, method: SyncMethod) -> SyncArgs {
        let mut args = SyncArgs::new(method)
            .with_put_mapping(self.put_mapping)
            .with_offset(self.offset)
            .with_nobulk(self.nobulk)
            .with_include(self.include.clone())
            .with_kinds(self.kinds.iter().map(ContentKind::new).collect())
            .with_content_types(self.content_types.clone())
            .with_id_bounds(self.lower_id, self.upper_id);

        if let Some(per_page) = self.per_page {
            args = args.with_per_page(per_page);
        }
        if self.advanced_pagination {
            args = args.with_advanced_pagination(true);
        }
        if let Some(attempts) = self.total_attempts {
            args = args.with_total_attempts(attempts);
        }
        if let Some(limit) = self.network_wide {
            args = args.with_network_wide(limit);
        }
        if let Some(tenant) = self.tenant {
            args = args.with_tenant(TenantId(tenant));
        }
        args
    }
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
