// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — static cover pages for encrypted exports, and inspection.

pub mod cover;
pub mod inspect;

pub use cover::CoverPage;
pub use inspect::PdfInspector;
