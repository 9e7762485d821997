// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Registrar — Core types, errors, configuration, and the record store
// interface shared across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod store;
pub mod types;

pub use config::ProvenanceConfig;
pub use error::{RegistrarError, Result};
pub use store::{MemoryStore, RecordStore};
pub use types::*;
