//! # sync-types
//!
//! Shared domain types for the bulk-sync system.
//!
//! This crate defines the data structures used throughout the workspace:
//! - Scopes: the (tenant, content kind) pair a unit of indexing work targets
//! - Records: source records as they are stored and fed to the search sink
//! - Settings: layered configuration for the daemon and the engine
//!
//! ## Usage
//!
//! ```rust
//! use sync_types::{ContentKind, Scope, TenantId};
//!
//! let scope = Scope::tenant(TenantId(2), ContentKind::new("post"));
//! assert_eq!(scope.to_string(), "post@2");
//! ```

pub mod config;
pub mod error;
pub mod record;
pub mod scope;

pub use config::{ContentKindSettings, Settings, TenantSettings};
pub use error::SyncTypesError;
pub use record::StoredRecord;
pub use scope::{ContentKind, ObjectId, Scope, TenantId};
