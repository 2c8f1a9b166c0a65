//! Configuration loading for bulk-sync.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/bulk-sync/config.toml`.

use std::collections::HashSet;
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::SyncTypesError;
use crate::scope::{ContentKind, TenantId};

const APP_NAME: &str = "bulk-sync";

/// A tenant (sub-site) known to the installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub id: TenantId,

    /// Host name, used for progress reporting
    #[serde(default)]
    pub domain: String,

    /// Path below the domain, used for progress reporting
    #[serde(default = "default_tenant_path")]
    pub path: String,

    /// Tenants flagged non-indexable are left out of every job
    #[serde(default = "default_true")]
    pub indexable: bool,
}

impl TenantSettings {
    pub fn new(id: u64) -> Self {
        Self {
            id: TenantId(id),
            domain: String::new(),
            path: default_tenant_path(),
            indexable: true,
        }
    }

    /// `domain + path` without the trailing slash.
    pub fn url(&self) -> String {
        format!("{}{}", self.domain, self.path)
            .trim_end_matches('/')
            .to_string()
    }
}

fn default_tenant_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

/// An indexable content kind and its display labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentKindSettings {
    pub slug: ContentKind,

    /// Singular label, used in per-record error lines
    pub singular: String,

    /// Plural label, used in progress messages
    pub plural: String,

    /// Global kinds are indexed once, not per tenant
    #[serde(default)]
    pub global: bool,
}

impl ContentKindSettings {
    pub fn new(slug: &str, singular: &str, plural: &str) -> Self {
        Self {
            slug: ContentKind::new(slug),
            singular: singular.to_string(),
            plural: plural.to_string(),
            global: false,
        }
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }
}

fn default_content_kinds() -> Vec<ContentKindSettings> {
    vec![
        ContentKindSettings::new("post", "Post", "Posts"),
        ContentKindSettings::new("term", "Term", "Terms"),
        ContentKindSettings::new("comment", "Comment", "Comments"),
        ContentKindSettings::new("user", "User", "Users").global(),
    ]
}

fn default_tenants() -> Vec<TenantSettings> {
    vec![TenantSettings::new(1)]
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory (records + checkpoints)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Root directory holding one Tantivy index per (tenant, kind)
    #[serde(default = "default_search_index_path")]
    pub search_index_path: String,

    /// Prefix for destination index names
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Records fetched per batch unless a run overrides it
    #[serde(default = "default_bulk_per_page")]
    pub bulk_per_page: usize,

    /// Delivery attempts per batch unless a run overrides it
    #[serde(default = "default_total_attempts")]
    pub total_attempts: u32,

    /// Page by last processed ID instead of offset
    #[serde(default)]
    pub advanced_pagination: bool,

    /// Idle period between steps for stepwise drivers
    #[serde(default = "default_step_idle_ms")]
    pub step_idle_ms: u64,

    /// Multi-tenant installation: index every indexable tenant and create
    /// cross-tenant aliases
    #[serde(default)]
    pub network: bool,

    /// Known tenants, in enumeration order
    #[serde(default = "default_tenants")]
    pub tenants: Vec<TenantSettings>,

    /// Indexable content kinds
    #[serde(default = "default_content_kinds")]
    pub content_kinds: Vec<ContentKindSettings>,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_search_index_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("indexes"))
        .unwrap_or_else(|| PathBuf::from("./indexes"))
        .to_string_lossy()
        .to_string()
}

fn default_index_prefix() -> String {
    "bulksync".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bulk_per_page() -> usize {
    350
}

fn default_total_attempts() -> u32 {
    1
}

fn default_step_idle_ms() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            search_index_path: default_search_index_path(),
            index_prefix: default_index_prefix(),
            log_level: default_log_level(),
            bulk_per_page: default_bulk_per_page(),
            total_attempts: default_total_attempts(),
            advanced_pagination: false,
            step_idle_ms: default_step_idle_ms(),
            network: false,
            tenants: default_tenants(),
            content_kinds: default_content_kinds(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/bulk-sync/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (SYNC_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, SyncTypesError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| SyncTypesError::Config(e.to_string()))?
            .set_default("search_index_path", default_search_index_path())
            .map_err(|e| SyncTypesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| SyncTypesError::Config(e.to_string()))?
            .set_default("bulk_per_page", default_bulk_per_page() as i64)
            .map_err(|e| SyncTypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: SYNC_DB_PATH, SYNC_BULK_PER_PAGE, SYNC_NETWORK, etc.
        builder = builder.add_source(
            Environment::with_prefix("SYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| SyncTypesError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncTypesError::Config(e.to_string()))?;

        settings.validate().map_err(SyncTypesError::Config)?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.bulk_per_page == 0 {
            return Err("bulk_per_page must be > 0".to_string());
        }
        if self.total_attempts == 0 {
            return Err("total_attempts must be > 0".to_string());
        }

        let mut slugs = HashSet::new();
        for kind in &self.content_kinds {
            let slug = kind.slug.as_str();
            if slug.is_empty() {
                return Err("content kind slug must not be empty".to_string());
            }
            if slug.contains(':') {
                return Err(format!("content kind slug must not contain ':': {}", slug));
            }
            if !slugs.insert(slug) {
                return Err(format!("duplicate content kind: {}", slug));
            }
        }

        let mut tenant_ids = HashSet::new();
        for tenant in &self.tenants {
            if tenant.id.0 == 0 {
                return Err("tenant id 0 is reserved for global content".to_string());
            }
            if !tenant_ids.insert(tenant.id) {
                return Err(format!("duplicate tenant: {}", tenant.id));
            }
        }
        Ok(())
    }

    /// Look up a content kind by slug.
    pub fn content_kind(&self, slug: &str) -> Option<&ContentKindSettings> {
        self.content_kinds.iter().find(|k| k.slug.as_str() == slug)
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in search_index_path to the home directory
    pub fn expanded_search_index_path(&self) -> PathBuf {
        expand_home(&self.search_index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
