//! Record sink trait and record types
//!
//! This module defines the trait interface for record sinks and the record
//! each processed address produces.

use crate::crawler::SessionReport;
use crate::state::{OutcomeSummary, SessionId};
use crate::url::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while writing records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write record: {0}")]
    Write(String),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Record receiver closed")]
    Closed,
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Extracted content of a successfully fetched page
#[derive(Debug, Clone, Serialize)]
pub struct PageContent {
    pub title: Option<String>,

    /// Decoded response body
    pub body: String,

    /// The body was not valid UTF-8 and was decoded lossily
    pub malformed: bool,
}

/// One record per address the session finished with
#[derive(Debug, Clone, Serialize)]
pub struct ContentRecord {
    pub session_id: SessionId,
    pub address: Address,
    pub depth: u32,
    pub discovered_from: Option<Address>,
    pub outcome: OutcomeSummary,
    pub extracted_links: Vec<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<PageContent>,
    pub fetched_at: DateTime<Utc>,
}

impl ContentRecord {
    pub fn is_success(&self) -> bool {
        self.outcome.kind == "success"
    }
}

/// Trait for record sinks
///
/// Sinks receive records one at a time, in the order workers produced them,
/// from a single consumer thread. Implementations must be thread-safe.
pub trait RecordSink: Send + Sync {
    /// Handles one record
    fn write(&self, record: &ContentRecord) -> SinkResult<()>;

    /// Called once after the last record, with the final session report
    fn finish(&self, report: &SessionReport) -> SinkResult<()> {
        let _ = report;
        Ok(())
    }
}
