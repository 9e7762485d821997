// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — opens the record store and audit log in the data
// directory, loads the provenance config, and hands out the provenance
// components bound to them.

use std::path::{Path, PathBuf};

use registrar_core::config::{CONFIG_FILE, ProvenanceConfig};
use registrar_core::error::Result;
use registrar_core::types::PrincipalId;
use registrar_security::audit::{AuditEntry, AuditLog, emit};
use registrar_security::integrity::hash_bytes;
use registrar_security::keys::KeyManager;
use registrar_security::{ContainerVariant, SecureContainerCodec, SigningSession};
use registrar_workflow::{ApprovalWorkflow, SqliteStore};
use tracing::info;

const RECORDS_DB: &str = "records.db";
const AUDIT_DB: &str = "audit.db";

/// Everything a command needs, opened once per invocation.
pub struct AppServices {
    store: SqliteStore,
    audit_log: AuditLog,
    config: ProvenanceConfig,
    codec: SecureContainerCodec,
    data_dir: PathBuf,
}

impl AppServices {
    /// Open the databases and config inside `data_dir`.
    pub fn init(data_dir: PathBuf) -> Result<Self> {
        info!(path = %data_dir.display(), "initialising app services");

        let config = ProvenanceConfig::load_or_default(&data_dir);
        config.validate()?;
        let store = SqliteStore::open(data_dir.join(RECORDS_DB))?;
        let audit_log = AuditLog::open(data_dir.join(AUDIT_DB))?;

        Ok(Self {
            store,
            audit_log,
            config,
            codec: SecureContainerCodec::new(),
            data_dir,
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn config(&self) -> &ProvenanceConfig {
        &self.config
    }

    pub fn codec(&self) -> &SecureContainerCodec {
        &self.codec
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write the active config to the data directory unless one exists.
    /// Returns whether a file was written.
    pub fn write_default_config(&self) -> Result<bool> {
        if self.data_dir.join(CONFIG_FILE).exists() {
            return Ok(false);
        }
        self.config.save(&self.data_dir)?;
        Ok(true)
    }

    // -- Components -----------------------------------------------------------

    pub fn keys(&self) -> Result<KeyManager<'_>> {
        Ok(KeyManager::new(&self.store, &self.config)?.with_audit(&self.audit_log))
    }

    pub fn workflow(&self) -> ApprovalWorkflow<'_> {
        ApprovalWorkflow::new(&self.store, &self.config).with_audit(&self.audit_log)
    }

    /// A signing session holding `principal`'s unlocked key.
    pub fn session_for(&self, principal: PrincipalId, secret: &str) -> Result<SigningSession> {
        let mut session = SigningSession::new();
        session.insert(self.keys()?.unlock(principal, secret)?);
        Ok(session)
    }

    // -- Exports --------------------------------------------------------------

    /// Encrypt `payload` for `recipient`'s current public key.
    pub fn export(
        &self,
        recipient: PrincipalId,
        payload: &serde_json::Value,
        variant: ContainerVariant,
    ) -> Result<Vec<u8>> {
        let public_key = self.keys()?.public_key(recipient)?;
        let artifact = self.codec.encode(payload, &public_key, variant)?;
        self.audit(
            "export",
            &hash_bytes(&artifact),
            true,
            Some(&format!("recipient {recipient} as {}", variant.file_type())),
        );
        Ok(artifact)
    }

    /// Decrypt an artifact with `principal`'s private key.
    pub fn import(
        &self,
        principal: PrincipalId,
        secret: &str,
        artifact: &[u8],
    ) -> Result<serde_json::Value> {
        let unlocked = self.keys()?.unlock(principal, secret)?;
        let outcome = self.codec.decode_value(artifact, unlocked.private_key());
        let details = match &outcome {
            Ok(_) => format!("principal {principal}"),
            Err(e) => format!("principal {principal}: {e}"),
        };
        self.audit("import", &hash_bytes(artifact), outcome.is_ok(), Some(&details));
        outcome
    }

    // -- Audit trail ----------------------------------------------------------

    fn audit(&self, action: &str, subject: &str, success: bool, details: Option<&str>) {
        if self.config.audit_enabled {
            emit(&self.audit_log, action, subject, success, details);
        }
    }

    pub fn recent_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        self.audit_log.recent_entries(limit)
    }

    pub fn audit_entries_for_subject(&self, subject: &str) -> Result<Vec<AuditEntry>> {
        self.audit_log.entries_for_subject(subject)
    }

    pub fn audit_count(&self) -> Result<u64> {
        self.audit_log.count()
    }
}

#[cfg(test)]
mod tests {
    use registrar_core::config::SecretHashing;
    use registrar_core::error::RegistrarError;
    use registrar_core::store::RecordStore;
    use registrar_core::types::{Principal, Role};
    use serde_json::json;

    use super::*;

    fn services(dir: &Path) -> AppServices {
        ProvenanceConfig {
            secret_hashing: SecretHashing {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..ProvenanceConfig::default()
        }
        .save(dir)
        .unwrap();
        AppServices::init(dir.to_path_buf()).unwrap()
    }

    fn student(id: PrincipalId) -> Principal {
        Principal {
            id,
            name: format!("Student {id}"),
            email: format!("s{id}@uni.example"),
            role: Role::Student,
            faculty: Some("Science".into()),
            department: Some("Computer Science".into()),
        }
    }

    #[test]
    fn export_then_import_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = services(tmp.path());
        svc.store().put_principal(&student(10)).unwrap();
        let keys = svc.keys().unwrap();
        keys.set_key_access_secret(10, "student-secret").unwrap();
        keys.provision(10, "student-secret").unwrap();

        let payload = json!({"gpa": 3.5, "courses": ["CSC301"]});
        let artifact = svc.export(10, &payload, ContainerVariant::Generic).unwrap();
        assert_eq!(svc.import(10, "student-secret", &artifact).unwrap(), payload);

        assert!(matches!(
            svc.import(10, "wrong-secret", &artifact),
            Err(RegistrarError::KeyAccessDenied(10))
        ));

        let actions: Vec<_> = svc
            .recent_audit_entries(10)
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert!(actions.iter().any(|a| a == "export"));
        assert!(actions.iter().any(|a| a == "import"));
    }

    #[test]
    fn default_config_written_once() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = AppServices::init(tmp.path().to_path_buf()).unwrap();
        assert!(svc.write_default_config().unwrap());
        assert!(!svc.write_default_config().unwrap());
        assert!(tmp.path().join(CONFIG_FILE).exists());
    }
}
