// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Result approval workflow — a signed state machine over result records.
//
//            submit            approve
//   Draft ──────────► Pending ─────────► Published
//     ▲                  │  │
//     │     revise       │  └─ approve ─► Approved ── publish ──► Published
//     └──── Denied ◄─────┘       (separate publication only)
//                deny
//
// Every transition except `revise` is signed by the acting principal with the
// key they unlocked into their `SigningSession`. The signature covers the
// SHA-256 of the canonical submission payload, which is computed once at
// submission and stored as `record.hash`.
//
// The state check, the signature and the state change all happen inside one
// `RecordStore::update_result` call: if signing fails nothing is written, and
// two racing transitions on the same record cannot both pass the state check.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use registrar_core::config::{LedgerPolicy, ProvenanceConfig};
use registrar_core::error::{RegistrarError, Result};
use registrar_core::store::RecordStore;
use registrar_core::types::{
    Grade, NewResult, Principal, PrincipalId, ResultId, ResultRecord, ResultStatus, Scores,
    SignatureRecord, SignedAction, SubmissionContext, SubmitterInfo,
};
use registrar_security::audit::{AuditSink, emit};
use registrar_security::certificates::check_certificate;
use registrar_security::custody::{SigningSession, UnlockedKey};
use registrar_security::integrity::{canonical_json, ensure_hash, hash_canonical, hash_str};
use registrar_security::signature;

use crate::{grading, policy};

// ---------------------------------------------------------------------------
// Submission payload
// ---------------------------------------------------------------------------

/// The fields of a result that a submission attests to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionPayload<'a> {
    result_id: ResultId,
    student_id: PrincipalId,
    course_code: &'a str,
    semester: &'a str,
    session: &'a str,
    faculty: &'a str,
    department: &'a str,
    ca_score: f64,
    exam_score: f64,
    total: f64,
    grade: Grade,
    cycle: u32,
    submitted_by: PrincipalId,
}

impl<'a> SubmissionPayload<'a> {
    fn of(record: &'a ResultRecord, submitter: PrincipalId) -> Self {
        Self {
            result_id: record.id,
            student_id: record.student_id,
            course_code: &record.course_code,
            semester: &record.semester,
            session: &record.session,
            faculty: &record.faculty,
            department: &record.department,
            ca_score: record.ca_score,
            exam_score: record.exam_score,
            total: record.total,
            grade: record.grade,
            cycle: record.cycle,
            submitted_by: submitter,
        }
    }
}

/// SHA-256 of the canonical submission payload of `record` as submitted by
/// `submitter`.
pub fn submission_hash(record: &ResultRecord, submitter: PrincipalId) -> Result<String> {
    hash_canonical(&SubmissionPayload::of(record, submitter))
}

/// Audit subject for a result record.
pub fn result_subject(record_id: ResultId) -> String {
    hash_str(&format!("result:{record_id}"))
}

fn invalid_transition(record: &ResultRecord, action: &str) -> RegistrarError {
    RegistrarError::InvalidTransition {
        record: record.id,
        from: record.status,
        action: action.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// ApprovalWorkflow
// ---------------------------------------------------------------------------

/// Drives result records through their signed lifecycle.
pub struct ApprovalWorkflow<'a> {
    store: &'a dyn RecordStore,
    config: &'a ProvenanceConfig,
    audit: Option<&'a dyn AuditSink>,
}

impl<'a> ApprovalWorkflow<'a> {
    pub fn new(store: &'a dyn RecordStore, config: &'a ProvenanceConfig) -> Self {
        Self {
            store,
            config,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: &'a dyn AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    fn report(
        &self,
        action: &str,
        record_id: ResultId,
        actor: PrincipalId,
        outcome: &Result<ResultRecord>,
    ) {
        let (success, details) = match outcome {
            Ok(record) => {
                info!(record_id, actor, %action, status = %record.status, "transition committed");
                (true, format!("actor {actor} cycle {} status {}", record.cycle, record.status))
            }
            Err(e) => {
                warn!(record_id, actor, %action, error = %e, "transition refused");
                (false, format!("actor {actor}: {e}"))
            }
        };
        if self.config.audit_enabled
            && let Some(sink) = self.audit
        {
            emit(sink, action, &result_subject(record_id), success, Some(&details));
        }
    }

    // -- Creation -------------------------------------------------------------

    /// Store a new Draft result authored by `author_id`.
    #[instrument(skip(self, input), fields(course = %input.course_code))]
    pub fn create_result(&self, author_id: PrincipalId, input: NewResult) -> Result<ResultRecord> {
        let author = self.store.principal(author_id)?;
        policy::require(
            policy::can_author(&author, &input.department),
            &author,
            "create results",
        )?;
        grading::validate(&input.scores)?;

        let total = grading::total(&input.scores);
        let now = Utc::now();
        let record = ResultRecord {
            id: 0,
            student_id: input.student_id,
            course_code: input.course_code,
            semester: input.semester,
            session: input.session,
            faculty: input.faculty,
            department: input.department,
            ca_score: input.scores.ca,
            exam_score: input.scores.exam,
            total,
            grade: grading::grade_for(total),
            status: ResultStatus::Draft,
            author_id,
            cycle: 1,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            hash: None,
            submitted_by: None,
            ip_address: None,
            user_agent: None,
            signatures: Default::default(),
            signature_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert_result(record)?;
        info!(record_id = stored.id, "draft result created");
        Ok(stored)
    }

    // -- Transitions ----------------------------------------------------------

    /// Draft → Pending. Hashes the submission payload and signs `submit`.
    pub fn submit(
        &self,
        record_id: ResultId,
        actor_id: PrincipalId,
        session: &SigningSession,
        context: SubmissionContext,
    ) -> Result<ResultRecord> {
        let outcome = self.try_submit(record_id, actor_id, session, context);
        self.report("submit", record_id, actor_id, &outcome);
        outcome
    }

    fn try_submit(
        &self,
        record_id: ResultId,
        actor_id: PrincipalId,
        session: &SigningSession,
        context: SubmissionContext,
    ) -> Result<ResultRecord> {
        let actor = self.store.principal(actor_id)?;
        let record = self.store.result(record_id)?;
        self.precheck(&record, ResultStatus::Draft, "submit")?;
        policy::require(policy::can_edit(&actor, &record), &actor, "submit")?;
        let key = self.signing_key(session, &actor)?;

        self.commit(record_id, ResultStatus::Draft, "submit", &mut |r| {
            let hash = submission_hash(r, actor.id)?;
            self.sign_into(r, &actor, key, SignedAction::Submit, &hash)?;
            r.hash = Some(hash);
            r.submitted_by = Some(SubmitterInfo {
                id: actor.id,
                email: actor.email.clone(),
                name: actor.name.clone(),
            });
            r.ip_address = context.ip_address.clone();
            r.user_agent = context.user_agent.clone();
            r.status = ResultStatus::Pending;
            Ok(())
        })
    }

    /// Pending → Published, or Pending → Approved when publication is a
    /// separate step. Signs `approve` over the stored submission hash.
    pub fn approve(
        &self,
        record_id: ResultId,
        approver_id: PrincipalId,
        session: &SigningSession,
        notes: Option<&str>,
    ) -> Result<ResultRecord> {
        let outcome = self.try_approve(record_id, approver_id, session, notes);
        self.report("approve", record_id, approver_id, &outcome);
        outcome
    }

    fn try_approve(
        &self,
        record_id: ResultId,
        approver_id: PrincipalId,
        session: &SigningSession,
        notes: Option<&str>,
    ) -> Result<ResultRecord> {
        let approver = self.store.principal(approver_id)?;
        let record = self.store.result(record_id)?;
        self.precheck(&record, ResultStatus::Pending, "approve")?;
        policy::require(policy::can_decide(&approver, &record), &approver, "approve")?;
        let key = self.signing_key(session, &approver)?;

        let next = if self.config.separate_publication {
            ResultStatus::Approved
        } else {
            ResultStatus::Published
        };
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());

        self.commit(record_id, ResultStatus::Pending, "approve", &mut |r| {
            let hash = stored_hash(r)?;
            self.sign_into(r, &approver, key, SignedAction::Approve, &hash)?;
            r.approved_by = Some(approver.id);
            r.approved_at = Some(Utc::now());
            r.approval_notes = notes.map(str::to_owned);
            r.status = next;
            Ok(())
        })
    }

    /// Pending → Denied with a mandatory reason. Signs `deny`.
    pub fn deny(
        &self,
        record_id: ResultId,
        approver_id: PrincipalId,
        session: &SigningSession,
        reason: &str,
    ) -> Result<ResultRecord> {
        let outcome = self.try_deny(record_id, approver_id, session, reason);
        self.report("deny", record_id, approver_id, &outcome);
        outcome
    }

    fn try_deny(
        &self,
        record_id: ResultId,
        approver_id: PrincipalId,
        session: &SigningSession,
        reason: &str,
    ) -> Result<ResultRecord> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RegistrarError::DenialReasonRequired);
        }
        let approver = self.store.principal(approver_id)?;
        let record = self.store.result(record_id)?;
        self.precheck(&record, ResultStatus::Pending, "deny")?;
        policy::require(policy::can_decide(&approver, &record), &approver, "deny")?;
        let key = self.signing_key(session, &approver)?;

        self.commit(record_id, ResultStatus::Pending, "deny", &mut |r| {
            let hash = stored_hash(r)?;
            self.sign_into(r, &approver, key, SignedAction::Deny, &hash)?;
            r.approved_by = Some(approver.id);
            r.approved_at = Some(Utc::now());
            r.approval_notes = Some(reason.to_owned());
            r.status = ResultStatus::Denied;
            Ok(())
        })
    }

    /// Approved → Published. Only exists when publication is separate.
    pub fn publish(
        &self,
        record_id: ResultId,
        actor_id: PrincipalId,
        session: &SigningSession,
    ) -> Result<ResultRecord> {
        let outcome = self.try_publish(record_id, actor_id, session);
        self.report("publish", record_id, actor_id, &outcome);
        outcome
    }

    fn try_publish(
        &self,
        record_id: ResultId,
        actor_id: PrincipalId,
        session: &SigningSession,
    ) -> Result<ResultRecord> {
        let actor = self.store.principal(actor_id)?;
        let record = self.store.result(record_id)?;
        if !self.config.separate_publication {
            return Err(invalid_transition(&record, "publish"));
        }
        self.precheck(&record, ResultStatus::Approved, "publish")?;
        policy::require(policy::can_decide(&actor, &record), &actor, "publish")?;
        let key = self.signing_key(session, &actor)?;

        self.commit(record_id, ResultStatus::Approved, "publish", &mut |r| {
            let hash = stored_hash(r)?;
            self.sign_into(r, &actor, key, SignedAction::Publish, &hash)?;
            r.status = ResultStatus::Published;
            Ok(())
        })
    }

    /// Denied → Draft for another cycle, optionally with corrected scores.
    ///
    /// The finished cycle's signatures leave the current map but stay in
    /// `signature_history`.
    pub fn revise(
        &self,
        record_id: ResultId,
        actor_id: PrincipalId,
        scores: Option<Scores>,
    ) -> Result<ResultRecord> {
        let outcome = self.try_revise(record_id, actor_id, scores);
        self.report("revise", record_id, actor_id, &outcome);
        outcome
    }

    fn try_revise(
        &self,
        record_id: ResultId,
        actor_id: PrincipalId,
        scores: Option<Scores>,
    ) -> Result<ResultRecord> {
        let actor = self.store.principal(actor_id)?;
        let record = self.store.result(record_id)?;
        self.precheck(&record, ResultStatus::Denied, "revise")?;
        policy::require(policy::can_edit(&actor, &record), &actor, "revise")?;
        if let Some(scores) = &scores {
            grading::validate(scores)?;
        }

        self.commit(record_id, ResultStatus::Denied, "revise", &mut |r| {
            if let Some(scores) = &scores {
                r.ca_score = scores.ca;
                r.exam_score = scores.exam;
                r.total = grading::total(scores);
                r.grade = grading::grade_for(r.total);
            }
            r.cycle += 1;
            r.status = ResultStatus::Draft;
            r.signatures.clear();
            r.hash = None;
            r.submitted_by = None;
            r.ip_address = None;
            r.user_agent = None;
            r.approved_by = None;
            r.approved_at = None;
            r.approval_notes = None;
            Ok(())
        })
    }

    // -- Verification ---------------------------------------------------------

    /// Re-derive the submission hash and verify every current signature
    /// against the certificate it was made under.
    #[instrument(skip(self))]
    pub fn verify_ledger(&self, record_id: ResultId) -> Result<()> {
        let record = self.store.result(record_id)?;

        let expected = match (&record.hash, &record.submitted_by) {
            (Some(hash), Some(submitter)) => {
                let payload = canonical_json(&SubmissionPayload::of(&record, submitter.id))?;
                ensure_hash(payload.as_bytes(), hash)?;
                hash
            }
            (None, _) if record.signatures.is_empty() => return Ok(()),
            _ => {
                return Err(RegistrarError::IntegrityMismatch {
                    expected: "submission hash and submitter".into(),
                    actual: "incomplete submission provenance".into(),
                });
            }
        };

        for sig in record.signatures.values() {
            if sig.content_hash != *expected {
                return Err(RegistrarError::IntegrityMismatch {
                    expected: expected.clone(),
                    actual: sig.content_hash.clone(),
                });
            }
            let material = self
                .store
                .key_material(sig.actor_id)?
                .ok_or_else(|| RegistrarError::not_found("key material", sig.actor_id))?;
            let certificate = material
                .certificate_by_serial(&sig.certificate_serial)
                .ok_or_else(|| RegistrarError::not_found("certificate", &sig.certificate_serial))?;

            signature::verify_against_certificate(
                record.id,
                sig.actor_id,
                sig.action.as_str(),
                &sig.timestamp,
                &sig.content_hash,
                &sig.signature,
                certificate,
            )?;
        }

        info!(signatures = record.signatures.len(), "ledger verified");
        Ok(())
    }

    // -- Internals ------------------------------------------------------------

    /// State check before any key work, so a wrong state is reported as such.
    fn precheck(&self, record: &ResultRecord, expected: ResultStatus, action: &str) -> Result<()> {
        if record.status == expected {
            Ok(())
        } else {
            Err(invalid_transition(record, action))
        }
    }

    /// Apply `change` under the store's write serialisation, re-checking the
    /// state against whatever is stored now.
    fn commit(
        &self,
        record_id: ResultId,
        expected: ResultStatus,
        action: &str,
        change: &mut dyn FnMut(&mut ResultRecord) -> Result<()>,
    ) -> Result<ResultRecord> {
        self.store.update_result(record_id, &mut |r| {
            if r.status != expected {
                return Err(invalid_transition(r, action));
            }
            change(r)?;
            r.updated_at = Utc::now();
            Ok(())
        })
    }

    /// The actor's unlocked key, provided it is bound to their current,
    /// currently valid certificate.
    fn signing_key<'s>(
        &self,
        session: &'s SigningSession,
        actor: &Principal,
    ) -> Result<&'s UnlockedKey> {
        let material = self.store.key_material(actor.id)?.ok_or_else(|| {
            RegistrarError::SigningFailure(format!("principal {} has no key pair", actor.id))
        })?;
        let key = session.key_for(actor.id)?;

        if key.certificate().serial_number != material.certificate.serial_number {
            return Err(RegistrarError::InvalidCertificate(format!(
                "certificate {} was superseded by {}",
                key.certificate().serial_number,
                material.certificate.serial_number
            )));
        }
        check_certificate(key.certificate(), Utc::now())?;
        Ok(key)
    }

    fn sign_into(
        &self,
        record: &mut ResultRecord,
        actor: &Principal,
        key: &UnlockedKey,
        action: SignedAction,
        content_hash: &str,
    ) -> Result<()> {
        let out = signature::sign(
            record.id,
            actor.id,
            action.as_str(),
            content_hash,
            key.private_key(),
        )?;
        let entry = SignatureRecord {
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            actor_email: actor.email.clone(),
            signature: out.signature,
            timestamp: out.timestamp,
            action,
            content_hash: content_hash.to_owned(),
            certificate_serial: key.certificate().serial_number.clone(),
            cycle: record.cycle,
        };

        if self.config.ledger_policy == LedgerPolicy::AppendOnly {
            record.signature_history.push(entry.clone());
        }
        record.signatures.insert(action, entry);
        Ok(())
    }
}

fn stored_hash(record: &ResultRecord) -> Result<String> {
    record.hash.clone().ok_or_else(|| {
        RegistrarError::SigningFailure(format!("result {} has no submission hash", record.id))
    })
}
