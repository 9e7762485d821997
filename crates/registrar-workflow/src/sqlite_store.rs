// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent record store backed by SQLite.
//
// Each entity is stored as its JSON body next to the columns needed to find
// it. Result updates run inside an IMMEDIATE transaction, so two processes
// updating the same database serialise on the write lock and a failed
// closure rolls back.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, instrument};

use registrar_core::error::{RegistrarError, Result};
use registrar_core::store::RecordStore;
use registrar_core::types::{
    KeyAccessGate, Principal, PrincipalId, ResultId, ResultRecord, StoredKeyMaterial,
};

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS principals (
        id INTEGER PRIMARY KEY,
        body TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS key_material (
        principal_id INTEGER PRIMARY KEY,
        body TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS key_access_gates (
        principal_id INTEGER PRIMARY KEY,
        body TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        status TEXT NOT NULL,
        body TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> RegistrarError + '_ {
    move |e| RegistrarError::Database(format!("{context}: {e}"))
}

fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| RegistrarError::Database(format!("id {id} out of range")))
}

/// `RecordStore` over a single SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err("open"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err("WAL pragma"))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(db_err("create tables"))?;

        info!("record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory"))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(db_err("create tables"))?;

        debug!("in-memory record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RegistrarError::Database("record store lock poisoned".into()))
    }

    fn body_by_key(&self, table: &str, key_column: &str, key: u64) -> Result<Option<String>> {
        let sql = format!("SELECT body FROM {table} WHERE {key_column} = ?1");
        self.conn()?
            .query_row(&sql, params![sql_id(key)?], |row| row.get(0))
            .optional()
            .map_err(db_err(table))
    }

    fn put_body(&self, table: &str, key_column: &str, key: u64, body: &str) -> Result<()> {
        let sql = format!("INSERT OR REPLACE INTO {table} ({key_column}, body) VALUES (?1, ?2)");
        self.conn()?
            .execute(&sql, params![sql_id(key)?, body])
            .map_err(db_err(table))?;
        Ok(())
    }

    /// Every result record, oldest first.
    pub fn list_results(&self) -> Result<Vec<ResultRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT body FROM results ORDER BY id ASC")
            .map_err(db_err("prepare list_results"))?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err("query list_results"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("collect rows"))?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(RegistrarError::from))
            .collect()
    }
}

impl RecordStore for SqliteStore {
    fn principal(&self, id: PrincipalId) -> Result<Principal> {
        let body = self
            .body_by_key("principals", "id", id)?
            .ok_or_else(|| RegistrarError::not_found("principal", id))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn put_principal(&self, principal: &Principal) -> Result<()> {
        let body = serde_json::to_string(principal)?;
        self.put_body("principals", "id", principal.id, &body)
    }

    fn key_material(&self, principal: PrincipalId) -> Result<Option<StoredKeyMaterial>> {
        self.body_by_key("key_material", "principal_id", principal)?
            .map(|body| serde_json::from_str(&body).map_err(RegistrarError::from))
            .transpose()
    }

    fn put_key_material(&self, material: &StoredKeyMaterial) -> Result<()> {
        let body = serde_json::to_string(material)?;
        self.put_body("key_material", "principal_id", material.principal_id, &body)
    }

    fn key_access_gate(&self, principal: PrincipalId) -> Result<Option<KeyAccessGate>> {
        self.body_by_key("key_access_gates", "principal_id", principal)?
            .map(|body| serde_json::from_str(&body).map_err(RegistrarError::from))
            .transpose()
    }

    fn insert_key_access_gate(&self, gate: &KeyAccessGate) -> Result<bool> {
        let body = serde_json::to_string(gate)?;
        let inserted = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO key_access_gates (principal_id, body) VALUES (?1, ?2)",
                params![sql_id(gate.principal_id)?, body],
            )
            .map_err(db_err("key_access_gates"))?;
        Ok(inserted == 1)
    }

    fn result(&self, id: ResultId) -> Result<ResultRecord> {
        let body = self
            .body_by_key("results", "id", id)?
            .ok_or_else(|| RegistrarError::not_found("result", id))?;
        Ok(serde_json::from_str(&body)?)
    }

    #[instrument(skip_all, fields(course = %record.course_code))]
    fn insert_result(&self, mut record: ResultRecord) -> Result<ResultRecord> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err("begin"))?;

        tx.execute(
            "INSERT INTO results (status, body, updated_at) VALUES (?1, '{}', ?2)",
            params![record.status.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(db_err("insert result"))?;
        let rowid = tx.last_insert_rowid();
        record.id = u64::try_from(rowid)
            .map_err(|_| RegistrarError::Database(format!("negative rowid {rowid}")))?;

        tx.execute(
            "UPDATE results SET body = ?1 WHERE id = ?2",
            params![serde_json::to_string(&record)?, rowid],
        )
        .map_err(db_err("store result body"))?;
        tx.commit().map_err(db_err("commit"))?;

        debug!(result_id = record.id, "result inserted");
        Ok(record)
    }

    #[instrument(skip(self, apply))]
    fn update_result(
        &self,
        id: ResultId,
        apply: &mut dyn FnMut(&mut ResultRecord) -> Result<()>,
    ) -> Result<ResultRecord> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err("begin"))?;

        let body: String = tx
            .query_row(
                "SELECT body FROM results WHERE id = ?1",
                params![sql_id(id)?],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("results"))?
            .ok_or_else(|| RegistrarError::not_found("result", id))?;

        let mut record: ResultRecord = serde_json::from_str(&body)?;
        // An error here drops `tx`, which rolls back.
        apply(&mut record)?;

        tx.execute(
            "UPDATE results SET status = ?1, body = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                record.status.as_str(),
                serde_json::to_string(&record)?,
                Utc::now().to_rfc3339(),
                sql_id(id)?,
            ],
        )
        .map_err(db_err("update result"))?;
        tx.commit().map_err(db_err("commit"))?;

        debug!(status = %record.status, "result updated");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use registrar_core::types::{Grade, ResultStatus, Role};

    use super::*;

    fn draft() -> ResultRecord {
        let now = Utc::now();
        ResultRecord {
            id: 0,
            student_id: 10,
            course_code: "CSC301".into(),
            semester: "first".into(),
            session: "2025/2026".into(),
            faculty: "Science".into(),
            department: "Computer Science".into(),
            ca_score: 23.0,
            exam_score: 32.0,
            total: 55.0,
            grade: Grade::C,
            status: ResultStatus::Draft,
            author_id: 3,
            cycle: 1,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            hash: None,
            submitted_by: None,
            ip_address: None,
            user_agent: None,
            signatures: BTreeMap::new(),
            signature_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn lecturer() -> Principal {
        Principal {
            id: 3,
            name: "Grace Hopper".into(),
            email: "grace@uni.example".into(),
            role: Role::Lecturer,
            faculty: Some("Science".into()),
            department: Some("Computer Science".into()),
        }
    }

    #[test]
    fn principal_round_trip() {
        let store = SqliteStore::open_in_memory().expect("open in-memory db");
        store.put_principal(&lecturer()).unwrap();
        assert_eq!(store.principal(3).unwrap(), lecturer());
        assert!(matches!(
            store.principal(4),
            Err(RegistrarError::NotFound { kind: "principal", .. })
        ));
    }

    #[test]
    fn insert_assigns_ids() {
        let store = SqliteStore::open_in_memory().expect("open in-memory db");
        let a = store.insert_result(draft()).unwrap();
        let b = store.insert_result(draft()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.result(b.id).unwrap().id, b.id);
        assert_eq!(store.list_results().unwrap().len(), 2);
    }

    #[test]
    fn failed_update_rolls_back() {
        let store = SqliteStore::open_in_memory().expect("open in-memory db");
        let record = store.insert_result(draft()).unwrap();

        let outcome = store.update_result(record.id, &mut |r| {
            r.status = ResultStatus::Pending;
            r.hash = Some("abc".into());
            Err(RegistrarError::SigningFailure("no key".into()))
        });
        assert!(outcome.is_err());

        let stored = store.result(record.id).unwrap();
        assert_eq!(stored.status, ResultStatus::Draft);
        assert!(stored.hash.is_none());
    }

    #[test]
    fn update_missing_result_is_not_found() {
        let store = SqliteStore::open_in_memory().expect("open in-memory db");
        let outcome = store.update_result(42, &mut |_| Ok(()));
        assert!(matches!(outcome, Err(RegistrarError::NotFound { kind: "result", .. })));
    }

    #[test]
    fn gate_is_insert_once() {
        let store = SqliteStore::open_in_memory().expect("open in-memory db");
        let gate = KeyAccessGate {
            principal_id: 3,
            secret_hash: "$argon2id$first".into(),
            established_at: Utc::now(),
        };
        assert!(store.insert_key_access_gate(&gate).unwrap());
        let second = KeyAccessGate {
            secret_hash: "$argon2id$second".into(),
            ..gate
        };
        assert!(!store.insert_key_access_gate(&second).unwrap());
        assert_eq!(
            store.key_access_gate(3).unwrap().unwrap().secret_hash,
            "$argon2id$first"
        );
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.put_principal(&lecturer()).unwrap();
            let record = store.insert_result(draft()).unwrap();
            store
                .update_result(record.id, &mut |r| {
                    r.status = ResultStatus::Pending;
                    Ok(())
                })
                .unwrap();
            record.id
        };

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.result(id).unwrap().status, ResultStatus::Pending);
        assert_eq!(reopened.principal(3).unwrap().name, "Grace Hopper");
    }
}
