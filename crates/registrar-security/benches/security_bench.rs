// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for integrity hashing, secure container encoding,
// action signatures, and audit logging in the registrar-security crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::json;

use registrar_security::audit::AuditSink;
use registrar_security::signature::{sign, verify};
use registrar_security::{AuditLog, ContainerVariant, SecureContainerCodec, hash_bytes, hash_canonical};

fn key_pair() -> (RsaPrivateKey, RsaPublicKey) {
    let private_key =
        RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("generate bench key");
    let public_key = RsaPublicKey::from(&private_key);
    (private_key, public_key)
}

/// SHA-256 hashing from a single result record up to a bulk export.
fn bench_integrity_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[
        ("1 KiB", 1024),
        ("10 KiB", 10 * 1024),
        ("100 KiB", 100 * 1024),
        ("1 MiB", 1024 * 1024),
    ];

    let mut group = c.benchmark_group("integrity_hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0xABu8; size];
        group.bench_function(label, |b| {
            b.iter(|| black_box(hash_bytes(black_box(&data))));
        });
    }
    group.finish();
}

/// Canonical JSON + hash of a submission-sized payload.
fn bench_canonical_hash(c: &mut Criterion) {
    let payload = json!({
        "studentId": 1042,
        "courseCode": "CSC301",
        "semester": "first",
        "session": "2024/2025",
        "caScore": 28.5,
        "examScore": 55.0,
        "total": 83.5,
        "grade": "A",
        "submittedBy": 3,
        "submittedAt": "2025-01-15T10:00:00.000Z",
    });

    c.bench_function("hash_canonical (submission payload)", |b| {
        b.iter(|| black_box(hash_canonical(black_box(&payload)).expect("hash failed")));
    });
}

/// Encode then decode a 10 KiB transcript, generic and PDF variants.
fn bench_container_roundtrip(c: &mut Criterion) {
    let (private_key, public_key) = key_pair();
    let codec = SecureContainerCodec::new();
    let rows: Vec<_> = (0..100)
        .map(|i| json!({"course": format!("CSC{i:03}"), "total": 70.0, "grade": "A"}))
        .collect();
    let payload = json!({ "student": "Ada Lovelace", "results": rows });

    let mut group = c.benchmark_group("container_roundtrip");
    for variant in [ContainerVariant::Generic, ContainerVariant::Pdf] {
        group.bench_function(format!("{variant:?}"), |b| {
            b.iter(|| {
                let artifact = codec
                    .encode(black_box(&payload), &public_key, variant)
                    .expect("encode failed");
                let decoded = codec
                    .decode_value(&artifact, &private_key)
                    .expect("decode failed");
                black_box(decoded);
            });
        });
    }
    group.finish();
}

/// Sign and verify one approval.
fn bench_sign_verify(c: &mut Criterion) {
    let (private_key, public_key) = key_pair();
    let data_hash = hash_bytes(b"result 7");

    c.bench_function("sign_verify (RSA-2048 PKCS#1 v1.5)", |b| {
        b.iter(|| {
            let out = sign(7, 9, "approve", black_box(&data_hash), &private_key)
                .expect("sign failed");
            assert!(verify(7, 9, "approve", &out.timestamp, &data_hash, &out.signature, &public_key));
        });
    });
}

/// Steady-state insertion into an in-memory audit log.
fn bench_audit_record(c: &mut Criterion) {
    c.bench_function("audit_record (in-memory SQLite)", |b| {
        let log = AuditLog::open_in_memory().expect("open in-memory audit log");

        b.iter(|| {
            log.record(
                black_box("approve"),
                black_box("abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890"),
                black_box(true),
                black_box(Some("benchmark entry")),
            )
            .expect("record failed");
        });
    });
}

criterion_group!(
    benches,
    bench_integrity_hash,
    bench_canonical_hash,
    bench_container_roundtrip,
    bench_sign_verify,
    bench_audit_record,
);
criterion_main!(benches);
