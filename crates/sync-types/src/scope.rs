//! Identifiers for tenants, content kinds and the scope pairing them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identifier of a source record.
///
/// Record IDs are positive and ordered; advanced pagination relies on that
/// ordering to resume after the last processed record.
pub type ObjectId = u64;

/// Identifier of an isolated sub-site sharing the installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TenantId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Slug of an indexable category of records (e.g. "post", "term", "user").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKind(String);

impl ContentKind {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentKind {
    fn from(slug: &str) -> Self {
        Self::new(slug)
    }
}

/// The (tenant, content kind) pair a query, index or bulk call targets.
///
/// `tenant` is `None` for tenant-global content kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub tenant: Option<TenantId>,
    pub kind: ContentKind,
}

impl Scope {
    /// Scope for a tenant-global content kind.
    pub fn global(kind: ContentKind) -> Self {
        Self { tenant: None, kind }
    }

    /// Scope for a tenant-scoped content kind.
    pub fn tenant(tenant: TenantId, kind: ContentKind) -> Self {
        Self {
            tenant: Some(tenant),
            kind,
        }
    }

    pub fn is_global(&self) -> bool {
        self.tenant.is_none()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tenant {
            Some(tenant) => write!(f, "{}@{}", self.kind, tenant),
            None => write!(f, "{}@global", self.kind),
        }
    }
}
