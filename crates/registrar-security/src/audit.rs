// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — provenance components emit events through `AuditSink`; the
// reference sink is an append-only SQLite log.
//
// Schema:
//   audit_log(
//     id        INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp TEXT    NOT NULL,   -- RFC 3339
//     action    TEXT    NOT NULL,   -- e.g. "provision", "submit", "approve"
//     subject   TEXT    NOT NULL,   -- SHA-256 hex: record hash or key fingerprint
//     success   INTEGER NOT NULL,   -- 0 = refused/failed, 1 = success
//     details   TEXT                -- optional free-form context
//   )

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use registrar_core::error::{RegistrarError, Result};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    action    TEXT    NOT NULL,
    subject   TEXT    NOT NULL,
    success   INTEGER NOT NULL,
    details   TEXT
);";

/// Convert a `rusqlite::Error` into a `RegistrarError::Database`.
fn db_err(e: rusqlite::Error) -> RegistrarError {
    RegistrarError::Database(e.to_string())
}

/// Receiver of provenance events. Persisting them is the sink's business.
pub trait AuditSink: Send + Sync {
    fn record(&self, action: &str, subject: &str, success: bool, details: Option<&str>)
    -> Result<()>;
}

/// Forward an event to `sink`, logging instead of failing if the sink errors.
///
/// Events are emitted after the state change they describe has committed, so
/// a sink failure must not be reported as a failure of that change.
pub fn emit(sink: &dyn AuditSink, action: &str, subject: &str, success: bool, details: Option<&str>) {
    if let Err(e) = sink.record(action, subject, success, details) {
        error!(%action, error = %e, "audit event dropped");
    }
}

/// A single entry in the audit log, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub subject: String,
    pub success: bool,
    pub details: Option<String>,
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Mutex<Connection>,
}

impl AuditLog {
    /// Open (or create) the audit database at `path`, in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory audit log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RegistrarError::Database("audit log lock poisoned".into()))
    }

    /// All entries for a subject, oldest first.
    pub fn entries_for_subject(&self, subject: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, action, subject, success, details
                 FROM audit_log
                 WHERE subject = ?1
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![subject], row_to_entry)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, action, subject, success, details
                 FROM audit_log
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt.query_map(params![limit], row_to_entry).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn()?
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        action: row.get(2)?,
        subject: row.get(3)?,
        success: row.get::<_, i32>(4)? != 0,
        details: row.get(5)?,
    })
}

impl AuditSink for AuditLog {
    #[instrument(skip(self, details), fields(%action, %subject, success))]
    fn record(
        &self,
        action: &str,
        subject: &str,
        success: bool,
        details: Option<&str>,
    ) -> Result<()> {
        let timestamp = Utc::now().to_rfc3339();
        self.conn()?
            .execute(
                "INSERT INTO audit_log (timestamp, action, subject, success, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![timestamp, action, subject, i32::from(success), details],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> AuditLog {
        AuditLog::open_in_memory().expect("open in-memory audit log")
    }

    #[test]
    fn record_and_count() {
        let log = make_log();
        assert_eq!(log.count().unwrap(), 0);

        log.record("submit", "abc123", true, None).unwrap();
        log.record("approve", "abc123", true, Some("ok")).unwrap();

        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn entries_for_subject() {
        let log = make_log();
        log.record("submit", "aaa", true, None).unwrap();
        log.record("provision", "bbb", true, None).unwrap();
        log.record("approve", "aaa", false, Some("not pending"))
            .unwrap();

        let entries = log.entries_for_subject("aaa").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "submit");
        assert!(entries[0].success);
        assert_eq!(entries[1].action, "approve");
        assert!(!entries[1].success);
        assert_eq!(entries[1].details.as_deref(), Some("not pending"));
    }

    #[test]
    fn recent_entries_ordering() {
        let log = make_log();
        for i in 0..5 {
            log.record("unlock", &format!("subject_{i}"), true, None)
                .unwrap();
        }

        let recent = log.recent_entries(3).unwrap();
        assert_eq!(recent.len(), 3);
        // Newest first.
        assert!(recent[0].id > recent[1].id);
        assert!(recent[1].id > recent[2].id);
    }

    #[test]
    fn on_disk_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");

        {
            let log = AuditLog::open(&path).unwrap();
            log.record("deny", "ccc", true, Some("score mismatch")).unwrap();
        }
        let reopened = AuditLog::open(&path).unwrap();
        assert_eq!(reopened.entries_for_subject("ccc").unwrap().len(), 1);
    }
}
