// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// registrar-document — PDF handling for Registrar exports.
//
// Encrypted exports can be wrapped in a minimal one-page PDF so that they
// remain openable files; this crate renders that page and can parse a PDF
// body back to check it.

pub mod pdf;

pub use pdf::cover::CoverPage;
pub use pdf::inspect::PdfInspector;
