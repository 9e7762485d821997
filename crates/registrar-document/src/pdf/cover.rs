// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cover page writer — a one-page, text-only PDF 1.4 document built with
// `lopdf`. Encrypted exports append their payload after this body, so the
// artifact still opens in any PDF viewer and shows the recipient how to
// decrypt it.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use registrar_core::error::{RegistrarError, Result};
use tracing::{debug, instrument};

/// A4 in PDF points.
const PAGE_WIDTH_PT: i64 = 595;
const PAGE_HEIGHT_PT: i64 = 842;

const MARGIN_PT: i64 = 72;
const TITLE_SIZE_PT: i64 = 18;
const BODY_SIZE_PT: i64 = 11;
const LINE_HEIGHT_PT: i64 = 16;

/// Builds the static cover page placed in front of PDF-wrapped exports.
#[derive(Debug, Clone)]
pub struct CoverPage {
    title: String,
    lines: Vec<String>,
}

impl CoverPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
        }
    }

    /// The default cover used for encrypted academic exports.
    pub fn encrypted_export() -> Self {
        Self::new("Encrypted Academic Document")
            .line("This document is encrypted for a single recipient.")
            .line("Open it in the academic records dashboard and provide")
            .line("your private key to view its contents.")
    }

    /// Append a body line.
    pub fn line(mut self, text: impl Into<String>) -> Self {
        self.lines.push(text.into());
        self
    }

    /// Serialise the cover page. The output starts with `%PDF-1.4` and ends
    /// with the `%%EOF` marker.
    #[instrument(skip(self), fields(title = %self.title, lines = self.lines.len()))]
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.4");

        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let content = Content {
            operations: self.text_operations(),
        };
        let encoded = content
            .encode()
            .map_err(|e| RegistrarError::Pdf(format!("encode cover content: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(PAGE_WIDTH_PT),
                    Object::Integer(PAGE_HEIGHT_PT),
                ],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| RegistrarError::Pdf(format!("serialise cover page: {e}")))?;

        debug!(bytes = output.len(), "cover page rendered");
        Ok(output)
    }

    fn text_operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        let mut y = PAGE_HEIGHT_PT - MARGIN_PT;

        push_text(&mut ops, TITLE_SIZE_PT, y, &self.title);
        y -= LINE_HEIGHT_PT * 2;

        for line in &self.lines {
            push_text(&mut ops, BODY_SIZE_PT, y, line);
            y -= LINE_HEIGHT_PT;
        }
        ops
    }
}

fn push_text(ops: &mut Vec<Operation>, size: i64, y: i64, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(b"F1".to_vec()), Object::Integer(size)],
    ));
    ops.push(Operation::new(
        "Td",
        vec![Object::Integer(MARGIN_PT), Object::Integer(y)],
    ));
    ops.push(Operation::new("Tj", vec![Object::string_literal(text)]));
    ops.push(Operation::new("ET", vec![]));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PdfInspector;

    #[test]
    fn renders_pdf_1_4_header() {
        let bytes = CoverPage::encrypted_export().render().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));
    }

    #[test]
    fn rendered_cover_has_one_page() {
        let bytes = CoverPage::new("Transcript").line("hello").render().unwrap();
        let inspector = PdfInspector::from_bytes(&bytes).unwrap();
        assert_eq!(inspector.page_count(), 1);
        assert_eq!(inspector.version(), "1.4");
    }

    #[test]
    fn cover_text_is_present() {
        let bytes = CoverPage::new("Transcript for Ada").render().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Transcript for Ada"));
    }
}
