//! Key encoding and decoding for storage layer.
//!
//! Record key format: `rec:{tenant:010}:{kind}:{id:020}`
//! - tenant: tenant ID zero-padded to 10 digits, `0` for tenant-global kinds
//! - kind: content kind slug (never contains ':')
//! - id: record ID zero-padded to 20 digits
//!
//! Zero padding keeps keys of one scope in ascending ID order, so ID-bounded
//! queries are plain forward range scans.

use sync_types::{ContentKind, ObjectId, Scope, TenantId};

use crate::error::StorageError;

/// Key for a source record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub scope: Scope,
    pub id: ObjectId,
}

impl RecordKey {
    pub fn new(scope: Scope, id: ObjectId) -> Self {
        Self { scope, id }
    }

    /// Prefix shared by every record of a scope.
    pub fn scope_prefix(scope: &Scope) -> Vec<u8> {
        let tenant = scope.tenant.map(|t| t.0).unwrap_or(0);
        format!("rec:{:010}:{}:", tenant, scope.kind).into_bytes()
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Self::scope_prefix(&self.scope);
        bytes.extend_from_slice(format!("{:020}", self.id).as_bytes());
        bytes
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 || parts[0] != "rec" {
            return Err(StorageError::Key(format!("Invalid record key format: {}", s)));
        }

        let tenant: u64 = parts[1]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid tenant: {}", e)))?;
        let id: ObjectId = parts[3]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid record id: {}", e)))?;

        let kind = ContentKind::new(parts[2]);
        let scope = if tenant == 0 {
            Scope::global(kind)
        } else {
            Scope::tenant(TenantId(tenant), kind)
        };

        Ok(Self { scope, id })
    }
}

/// Key for a checkpoint or option value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointKey {
    /// Name of the stored value (e.g., "sync_job", "last_index")
    pub name: String,
}

impl CheckpointKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("checkpoint:{}", self.name).into_bytes()
    }
}
