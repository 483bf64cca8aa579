use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use thiserror::Error;

use crate::db::models::Question;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const TITLE_SIZE_PT: f32 = 18.0;
const BODY_SIZE_PT: f32 = 11.0;
const LINE_HEIGHT_MM: f32 = 6.0;
const WRAP_COLUMNS: usize = 90;

#[derive(Debug, Error)]
pub(crate) enum RenderError {
    #[error("pdf rendering failed: {0}")]
    Pdf(String),
}

pub(crate) trait DocumentRenderer: Send + Sync {
    /// Renders `title` followed by `body`; blank lines in `body` become vertical space.
    fn render(&self, title: &str, body: &str) -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PdfRenderer;

impl DocumentRenderer for PdfRenderer {
    fn render(&self, title: &str, body: &str) -> Result<Vec<u8>, RenderError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "content");
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;

        let mut cursor = PageCursor { layer: doc.get_page(page).get_layer(layer), y: top() };

        for line in wrap(title, WRAP_COLUMNS / 2 + 10) {
            cursor.write(&doc, &line, TITLE_SIZE_PT, &bold);
        }
        cursor.y -= LINE_HEIGHT_MM;

        for raw in body.lines() {
            if raw.trim().is_empty() {
                cursor.y -= LINE_HEIGHT_MM / 2.0;
                continue;
            }
            for line in wrap(raw, WRAP_COLUMNS) {
                cursor.write(&doc, &line, BODY_SIZE_PT, &regular);
            }
        }

        doc.save_to_bytes().map_err(pdf_error)
    }
}

struct PageCursor {
    layer: PdfLayerReference,
    y: f32,
}

impl PageCursor {
    fn write(&mut self, doc: &PdfDocumentReference, text: &str, size: f32, font: &IndirectFontRef) {
        if self.y < MARGIN_MM {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "content");
            self.layer = doc.get_page(page).get_layer(layer);
            self.y = top();
        }
        self.layer.use_text(text, size, Mm(MARGIN_MM), Mm(self.y), font);
        self.y -= if size > BODY_SIZE_PT { LINE_HEIGHT_MM * 1.5 } else { LINE_HEIGHT_MM };
    }
}

fn top() -> f32 {
    PAGE_HEIGHT_MM - MARGIN_MM
}

fn pdf_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(err.to_string())
}

/// Greedy word wrap on character counts. Words longer than `width` are split.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() { 0 } else { current.chars().count() + 1 };
        if needed + word.chars().count() > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Body of a downloadable paper: one `Q{n}. {text}` paragraph per question.
pub(crate) fn paper_body(questions: &[Question]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| format!("Q{}. {}", index + 1, question.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn question(text: &str) -> Question {
        Question {
            id: String::new(),
            text: text.to_string(),
            question_type: None,
            options: None,
            marks: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn paper_body_numbers_questions() {
        let body = paper_body(&[question("What is 2+2?"), question("Name a prime.")]);
        assert_eq!(body, "Q1. What is 2+2?\n\nQ2. Name a prime.");
    }

    #[test]
    fn render_produces_pdf_bytes_across_pages() {
        let body = (1..=120).map(|n| format!("Q{n}. line")).collect::<Vec<_>>().join("\n");
        let bytes = PdfRenderer.render("Algebra Quiz", &body).expect("render");
        assert!(bytes.starts_with(b"%PDF"));
    }
}
