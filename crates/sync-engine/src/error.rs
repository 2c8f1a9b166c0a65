//! Error types for the sync engine.

use sync_search::SearchError;
use sync_storage::StorageError;
use sync_types::SyncTypesError;
use thiserror::Error;

/// Errors returned to the driver of a sync job.
///
/// Collaborator failures (source queries, bulk delivery, mapping, aliases)
/// are absorbed into job counters and progress messages. Only checkpoint
/// persistence and setup problems surface here.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Checkpoint store read/write issues
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A job checkpoint already exists
    #[error("A sync job is already in progress")]
    JobInProgress,

    /// No job to advance
    #[error("No sync job in progress")]
    NoJob,

    /// A content kind is not registered
    #[error("Unknown content kind: {0}")]
    UnknownContentKind(String),

    /// Invalid configuration or arguments
    #[error("Config error: {0}")]
    Config(String),

    /// Destination index setup error
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<SyncTypesError> for SyncError {
    fn from(err: SyncTypesError) -> Self {
        match err {
            SyncTypesError::Config(msg) => SyncError::Config(msg),
            other => SyncError::Serialization(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::Checkpoint("write refused".to_string());
        assert_eq!(err.to_string(), "Checkpoint error: write refused");

        assert_eq!(
            SyncError::JobInProgress.to_string(),
            "A sync job is already in progress"
        );
        assert_eq!(
            SyncError::UnknownContentKind("widget".to_string()).to_string(),
            "Unknown content kind: widget"
        );
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: SyncError = json_err.into();
        assert!(matches!(err, SyncError::Serialization(_)));
    }

    #[test]
    fn test_from_types_config_error() {
        let err: SyncError = SyncTypesError::Config("bad".to_string()).into();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
