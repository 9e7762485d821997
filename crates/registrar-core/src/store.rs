// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Record store interface — the persistence collaborator every provenance
// component is handed, plus an in-memory implementation.
//
// Implementations must serialise writes to the same result record:
// `update_result` is the only way a record changes after insertion, and it
// commits the closure's edits all at once or not at all.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{RegistrarError, Result};
use crate::types::{
    KeyAccessGate, Principal, PrincipalId, ResultId, ResultRecord, StoredKeyMaterial,
};

/// Repository of principals, key material, key access gates and result records.
pub trait RecordStore: Send + Sync {
    /// Fetch a principal, failing with `NotFound` when absent.
    fn principal(&self, id: PrincipalId) -> Result<Principal>;

    /// Insert or replace a principal.
    fn put_principal(&self, principal: &Principal) -> Result<()>;

    fn key_material(&self, principal: PrincipalId) -> Result<Option<StoredKeyMaterial>>;

    /// Insert or replace the key material of `material.principal_id`.
    fn put_key_material(&self, material: &StoredKeyMaterial) -> Result<()>;

    fn key_access_gate(&self, principal: PrincipalId) -> Result<Option<KeyAccessGate>>;

    /// Store `gate` only if the principal has none yet. Returns `false` when a
    /// gate already existed (and leaves it untouched).
    fn insert_key_access_gate(&self, gate: &KeyAccessGate) -> Result<bool>;

    /// Fetch a result record, failing with `NotFound` when absent.
    fn result(&self, id: ResultId) -> Result<ResultRecord>;

    /// Insert a new result record. The store assigns the id; the stored record
    /// is returned.
    fn insert_result(&self, record: ResultRecord) -> Result<ResultRecord>;

    /// Apply `apply` to a copy of the record and persist the copy only if the
    /// closure returns `Ok`. Concurrent updates of the same record are serialised.
    fn update_result(
        &self,
        id: ResultId,
        apply: &mut dyn FnMut(&mut ResultRecord) -> Result<()>,
    ) -> Result<ResultRecord>;
}

#[derive(Default)]
struct Tables {
    principals: HashMap<PrincipalId, Principal>,
    keys: HashMap<PrincipalId, StoredKeyMaterial>,
    gates: HashMap<PrincipalId, KeyAccessGate>,
    results: HashMap<ResultId, ResultRecord>,
    next_result_id: ResultId,
}

/// Process-local store guarded by a single mutex.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| RegistrarError::Database("memory store lock poisoned".into()))
    }
}

impl RecordStore for MemoryStore {
    fn principal(&self, id: PrincipalId) -> Result<Principal> {
        self.lock()?
            .principals
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistrarError::not_found("principal", id))
    }

    fn put_principal(&self, principal: &Principal) -> Result<()> {
        self.lock()?
            .principals
            .insert(principal.id, principal.clone());
        Ok(())
    }

    fn key_material(&self, principal: PrincipalId) -> Result<Option<StoredKeyMaterial>> {
        Ok(self.lock()?.keys.get(&principal).cloned())
    }

    fn put_key_material(&self, material: &StoredKeyMaterial) -> Result<()> {
        self.lock()?
            .keys
            .insert(material.principal_id, material.clone());
        Ok(())
    }

    fn key_access_gate(&self, principal: PrincipalId) -> Result<Option<KeyAccessGate>> {
        Ok(self.lock()?.gates.get(&principal).cloned())
    }

    fn insert_key_access_gate(&self, gate: &KeyAccessGate) -> Result<bool> {
        let mut tables = self.lock()?;
        if tables.gates.contains_key(&gate.principal_id) {
            return Ok(false);
        }
        tables.gates.insert(gate.principal_id, gate.clone());
        Ok(true)
    }

    fn result(&self, id: ResultId) -> Result<ResultRecord> {
        self.lock()?
            .results
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistrarError::not_found("result", id))
    }

    fn insert_result(&self, mut record: ResultRecord) -> Result<ResultRecord> {
        let mut tables = self.lock()?;
        tables.next_result_id += 1;
        record.id = tables.next_result_id;
        tables.results.insert(record.id, record.clone());
        debug!(result_id = record.id, "result inserted");
        Ok(record)
    }

    fn update_result(
        &self,
        id: ResultId,
        apply: &mut dyn FnMut(&mut ResultRecord) -> Result<()>,
    ) -> Result<ResultRecord> {
        let mut tables = self.lock()?;
        let current = tables
            .results
            .get(&id)
            .ok_or_else(|| RegistrarError::not_found("result", id))?;

        let mut updated = current.clone();
        apply(&mut updated)?;
        tables.results.insert(id, updated.clone());
        Ok(updated)
    }
}
