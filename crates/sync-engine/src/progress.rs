//! Progress reporting for sync jobs.
//!
//! Every message carries a snapshot of the stored job (or, once the job is
//! discarded, the last report), so observers always see persisted state.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::job::{LastSyncReport, SyncJob};

/// Severity of a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgressStatus::Info => "info",
            ProgressStatus::Success => "success",
            ProgressStatus::Warning => "warning",
            ProgressStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A structured progress message.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMessage<'a> {
    pub message: &'a str,
    /// The job as just persisted (None once discarded)
    pub job: Option<&'a SyncJob>,
    /// The last completed report, set when `job` is None
    pub last_report: Option<&'a LastSyncReport>,
    pub status: ProgressStatus,
    /// Emitting operation, e.g. "index_next_batch"
    pub context: &'a str,
}

/// Receives progress messages.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, message: &ProgressMessage<'_>);
}

/// A no-op sink for when progress reporting isn't needed.
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn emit(&self, _message: &ProgressMessage<'_>) {}
}

/// Forwards messages to `tracing` at a level derived from the status.
pub struct LoggingProgressSink;

impl ProgressSink for LoggingProgressSink {
    fn emit(&self, message: &ProgressMessage<'_>) {
        let offset = message.job.map(|job| job.offset).unwrap_or(0);
        match message.status {
            ProgressStatus::Info | ProgressStatus::Success => {
                info!(status = %message.status, offset, "{}", message.message)
            }
            ProgressStatus::Warning => warn!(offset, "{}", message.message),
            ProgressStatus::Error => error!(offset, "{}", message.message),
        }
    }
}

/// An owned copy of an emitted message.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMessage {
    pub message: String,
    pub status: ProgressStatus,
    pub context: String,
    /// Offset of the job snapshot, None when the job was discarded
    pub offset: Option<u64>,
    pub had_report: bool,
}

/// Keeps every message in memory, in order.
#[derive(Debug, Default)]
pub struct MemoryProgressSink {
    messages: Mutex<Vec<RecordedMessage>>,
}

impl MemoryProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded messages
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Message texts only
    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.message).collect()
    }
}

impl ProgressSink for MemoryProgressSink {
    fn emit(&self, message: &ProgressMessage<'_>) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(RecordedMessage {
                message: message.message.to_string(),
                status: message.status,
                context: message.context.to_string(),
                offset: message.job.map(|job| job.offset),
                had_report: message.last_report.is_some(),
            });
        }
    }
}
