// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end provenance scenarios over an on-disk SQLite store: a lecturer
// submits, a faculty officer approves or denies, and a transcript is exported
// to a student as an encrypted PDF.

use registrar_core::config::{ProvenanceConfig, SecretHashing};
use registrar_core::error::RegistrarError;
use registrar_core::store::RecordStore;
use registrar_core::types::{
    NewResult, Principal, PrincipalId, ResultStatus, Role, Scores, SignedAction, SubmissionContext,
};
use registrar_security::audit::AuditLog;
use registrar_security::container::PDF_MARKER;
use registrar_security::integrity::hash_canonical;
use registrar_security::keys::KeyManager;
use registrar_security::signature;
use registrar_security::{ContainerVariant, SecureContainerCodec, SigningSession};
use registrar_workflow::{ApprovalWorkflow, SqliteStore, submission_hash};
use serde_json::json;

const FACULTY_OFFICER: PrincipalId = 1;
const LECTURER: PrincipalId = 3;
const STUDENT: PrincipalId = 10;

fn config() -> ProvenanceConfig {
    ProvenanceConfig {
        secret_hashing: SecretHashing {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        ..ProvenanceConfig::default()
    }
}

fn seed(store: &SqliteStore) {
    let people = [
        (FACULTY_OFFICER, "Katherine Johnson", Role::Faculty, None),
        (LECTURER, "Grace Hopper", Role::Lecturer, Some("Computer Science")),
        (STUDENT, "Ada Lovelace", Role::Student, Some("Computer Science")),
    ];
    for (id, name, role, department) in people {
        store
            .put_principal(&Principal {
                id,
                name: name.into(),
                email: format!("{id}@uni.example"),
                role,
                faculty: Some("Science".into()),
                department: department.map(Into::into),
            })
            .unwrap();
    }
}

fn unlock_all(keys: &KeyManager<'_>, ids: &[PrincipalId]) -> SigningSession {
    let mut session = SigningSession::new();
    for &id in ids {
        let secret = format!("secret-of-{id}");
        keys.set_key_access_secret(id, &secret).unwrap();
        keys.provision(id, &secret).unwrap();
        session.insert(keys.unlock(id, &secret).unwrap());
    }
    session
}

fn new_result() -> NewResult {
    NewResult {
        student_id: STUDENT,
        course_code: "CSC301".into(),
        semester: "first".into(),
        session: "2025/2026".into(),
        faculty: "Science".into(),
        department: "Computer Science".into(),
        scores: Scores { ca: 23.0, exam: 32.0 },
    }
}

#[test]
fn submit_then_approve_publishes_with_two_signatures() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("records.db")).unwrap();
    let audit = AuditLog::open(dir.path().join("audit.db")).unwrap();
    let config = config();
    seed(&store);

    let keys = KeyManager::new(&store, &config).unwrap().with_audit(&audit);
    let session = unlock_all(&keys, &[FACULTY_OFFICER, LECTURER]);
    let workflow = ApprovalWorkflow::new(&store, &config).with_audit(&audit);

    let draft = workflow.create_result(LECTURER, new_result()).unwrap();

    // Submission.
    let context = SubmissionContext {
        ip_address: Some("10.0.0.7".into()),
        user_agent: Some("dashboard/2.1".into()),
    };
    let pending = workflow.submit(draft.id, LECTURER, &session, context).unwrap();
    assert_eq!(pending.status, ResultStatus::Pending);
    assert_eq!(pending.hash, Some(submission_hash(&draft, LECTURER).unwrap()));
    assert_eq!(pending.ip_address.as_deref(), Some("10.0.0.7"));
    assert_eq!(pending.submitted_by.as_ref().map(|s| s.id), Some(LECTURER));

    let submit = &pending.signatures[&SignedAction::Submit];
    assert!(signature::verify(
        draft.id,
        LECTURER,
        "submit",
        &submit.timestamp,
        &submit.content_hash,
        &submit.signature,
        &keys.public_key(LECTURER).unwrap(),
    ));

    // Approval.
    let published = workflow
        .approve(draft.id, FACULTY_OFFICER, &session, Some("ok"))
        .unwrap();
    assert_eq!(published.status, ResultStatus::Published);
    assert_eq!(published.approval_notes.as_deref(), Some("ok"));
    assert_eq!(published.signatures[&SignedAction::Submit], *submit);
    assert!(published.signatures.contains_key(&SignedAction::Approve));

    workflow.verify_ledger(draft.id).unwrap();
    assert_eq!(store.result(draft.id).unwrap(), published);

    // A second approval is a wrong-state transition.
    assert!(matches!(
        workflow.approve(draft.id, FACULTY_OFFICER, &session, None),
        Err(RegistrarError::InvalidTransition { from: ResultStatus::Published, .. })
    ));
    assert!(audit.count().unwrap() >= 5);
}

#[test]
fn deny_records_the_reason() {
    let store = SqliteStore::open_in_memory().unwrap();
    let config = config();
    seed(&store);

    let keys = KeyManager::new(&store, &config).unwrap();
    let session = unlock_all(&keys, &[FACULTY_OFFICER, LECTURER]);
    let workflow = ApprovalWorkflow::new(&store, &config);

    let draft = workflow.create_result(LECTURER, new_result()).unwrap();
    workflow
        .submit(draft.id, LECTURER, &session, SubmissionContext::default())
        .unwrap();
    let denied = workflow
        .deny(draft.id, FACULTY_OFFICER, &session, "score mismatch")
        .unwrap();

    assert_eq!(denied.status, ResultStatus::Denied);
    assert_eq!(denied.approval_notes.as_deref(), Some("score mismatch"));
    assert!(denied.signatures.contains_key(&SignedAction::Deny));
    assert!(!denied.signatures.contains_key(&SignedAction::Approve));
    workflow.verify_ledger(draft.id).unwrap();
}

#[test]
fn transcript_export_opens_only_for_the_student() {
    let store = SqliteStore::open_in_memory().unwrap();
    let config = config();
    seed(&store);

    let keys = KeyManager::new(&store, &config).unwrap();
    let session = unlock_all(&keys, &[STUDENT, LECTURER]);
    let codec = SecureContainerCodec::new();

    let artifact = codec
        .encode(&json!({"gpa": 3.5}), &keys.public_key(STUDENT).unwrap(), ContainerVariant::Pdf)
        .unwrap();
    assert!(artifact.starts_with(b"%PDF-1.4"));
    assert!(
        artifact
            .split(|b| *b == b'\n')
            .any(|line| line.starts_with(PDF_MARKER.as_bytes()) && line.len() > PDF_MARKER.len())
    );

    let student_key = session.key_for(STUDENT).unwrap().private_key();
    assert_eq!(codec.decode_value(&artifact, student_key).unwrap(), json!({"gpa": 3.5}));

    let lecturer_key = session.key_for(LECTURER).unwrap().private_key();
    assert!(matches!(
        codec.decode_value(&artifact, lecturer_key),
        Err(RegistrarError::DecryptionFailure(_))
    ));
}

#[test]
fn submission_hash_is_canonical() {
    let store = SqliteStore::open_in_memory().unwrap();
    let config = config();
    seed(&store);
    let workflow = ApprovalWorkflow::new(&store, &config);
    let draft = workflow.create_result(LECTURER, new_result()).unwrap();

    // Key order in the source object does not matter.
    let expected = hash_canonical(&json!({
        "submittedBy": LECTURER,
        "cycle": 1,
        "grade": "C",
        "total": 55.0,
        "examScore": 32.0,
        "caScore": 23.0,
        "department": "Computer Science",
        "faculty": "Science",
        "session": "2025/2026",
        "semester": "first",
        "courseCode": "CSC301",
        "studentId": STUDENT,
        "resultId": draft.id,
    }))
    .unwrap();
    assert_eq!(submission_hash(&draft, LECTURER).unwrap(), expected);
}
