//! Checkpoint store abstraction.
//!
//! The engine persists whole values under well-known keys. `Storage` is the
//! durable implementation; `MemoryCheckpointStore` backs tests and
//! single-process runs that need no durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sync_storage::Storage;

use crate::error::SyncError;

/// Durable key-value persistence for job state and reports.
pub trait CheckpointStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncError>;

    /// Remove a value. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), SyncError>;
}

impl CheckpointStore for Storage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError> {
        Ok(self.get_checkpoint(key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncError> {
        Ok(self.put_checkpoint(key, value)?)
    }

    fn delete(&self, key: &str) -> Result<(), SyncError> {
        Ok(self.delete_checkpoint(key)?)
    }
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), SyncError> {
        (**self).delete(key)
    }
}

/// In-memory checkpoint store.
///
/// Writes can be switched to fail, which lets tests exercise the one error
/// path the engine returns to its driver.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `set`/`delete` calls fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Whether a key currently holds a value
    pub fn contains(&self, key: &str) -> bool {
        self.values
            .lock()
            .map(|values| values.contains_key(key))
            .unwrap_or(false)
    }

    fn check_writable(&self) -> Result<(), SyncError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Checkpoint("store is read-only".to_string()));
        }
        Ok(())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let values = self
            .values
            .lock()
            .map_err(|e| SyncError::Checkpoint(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncError> {
        self.check_writable()?;
        let mut values = self
            .values
            .lock()
            .map_err(|e| SyncError::Checkpoint(e.to_string()))?;
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SyncError> {
        self.check_writable()?;
        let mut values = self
            .values
            .lock()
            .map_err(|e| SyncError::Checkpoint(e.to_string()))?;
        values.remove(key);
        Ok(())
    }
}
