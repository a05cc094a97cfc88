//! SQLite record sink
//!
//! Records are inserted as they arrive. When the session finishes, its final
//! report is stored as JSON keyed by the session ID so it can be reloaded later
//! with [`load_session_report`].

use crate::crawler::SessionReport;
use crate::output::traits::{ContentRecord, RecordSink, SinkError, SinkResult};
use crate::state::SessionId;
use crate::CrawlError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQL schema for the record database
pub const SCHEMA_SQL: &str = r#"
-- One row per finished session
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    status TEXT NOT NULL,
    config_hash TEXT,
    report_json TEXT NOT NULL
);

-- One row per processed address
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    address TEXT NOT NULL,
    depth INTEGER NOT NULL,
    discovered_from TEXT,
    outcome TEXT NOT NULL,
    status_code INTEGER,
    content_type TEXT,
    elapsed_ms INTEGER,
    detail TEXT,
    title TEXT,
    malformed INTEGER NOT NULL DEFAULT 0,
    links_json TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_session ON records(session_id);
CREATE INDEX IF NOT EXISTS idx_records_outcome ON records(outcome);
"#;

/// Record sink backed by a SQLite database
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(SinkError)` - Failed to open database or create the schema
    pub fn open(path: &Path) -> SinkResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> SinkResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SinkError::Write(format!("Failed to lock database: {}", e)))
    }

    /// Number of records stored for a session
    pub fn count_records(&self, session_id: &SessionId) -> SinkResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE session_id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Loads a stored session report
    pub fn load_report(&self, session_id: &SessionId) -> SinkResult<Option<SessionReport>> {
        let conn = self.lock()?;
        query_report(&conn, session_id)
    }
}

impl RecordSink for SqliteSink {
    fn write(&self, record: &ContentRecord) -> SinkResult<()> {
        let links_json = serde_json::to_string(&record.extracted_links)?;
        let title = record.content.as_ref().and_then(|c| c.title.clone());
        let malformed = record.content.as_ref().is_some_and(|c| c.malformed);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (session_id, address, depth, discovered_from, outcome,
                                  status_code, content_type, elapsed_ms, detail, title,
                                  malformed, links_json, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.session_id.to_string(),
                record.address.as_str(),
                record.depth,
                record.discovered_from.as_ref().map(|a| a.as_str()),
                record.outcome.kind,
                record.outcome.status_code,
                record.outcome.content_type,
                record.outcome.elapsed_ms.map(|ms| ms as i64),
                record.outcome.detail,
                title,
                malformed,
                links_json,
                record.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn finish(&self, report: &SessionReport) -> SinkResult<()> {
        let report_json = serde_json::to_string(report)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO sessions (id, started_at, finished_at, status, config_hash, report_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                report.session_id.to_string(),
                report.started_at.to_rfc3339(),
                report.finished_at.to_rfc3339(),
                report.status.to_db_string(),
                report.config_hash,
                report_json,
            ],
        )?;

        tracing::debug!("Stored report for session {}", report.session_id);
        Ok(())
    }
}

fn query_report(conn: &Connection, session_id: &SessionId) -> SinkResult<Option<SessionReport>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT report_json FROM sessions WHERE id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    json.map(|json| serde_json::from_str(&json).map_err(SinkError::from))
        .transpose()
}

/// Loads the final report of a session from a database written by [`SqliteSink`]
///
/// # Returns
///
/// * `Ok(SessionReport)` - The stored report
/// * `Err(CrawlError::SessionNotFound)` - No report is stored under this ID
/// * `Err(CrawlError)` - The database could not be read
pub fn load_session_report(path: &Path, session_id: &SessionId) -> crate::Result<SessionReport> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA_SQL)?;

    query_report(&conn, session_id)?
        .ok_or_else(|| CrawlError::SessionNotFound(session_id.to_string()))
}
