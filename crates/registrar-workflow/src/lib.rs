// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// registrar-workflow — the signed approval lifecycle of result records, the
// authorization rules it enforces, and a SQLite-backed record store.

pub mod grading;
pub mod policy;
pub mod sqlite_store;
pub mod workflow;

pub use sqlite_store::SqliteStore;
pub use workflow::{ApprovalWorkflow, submission_hash};
