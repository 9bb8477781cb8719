//! Plain-text extraction by MIME type
//!
//! PDF pages are read with lopdf and joined in page order. Plain text and
//! markdown are decoded lossily. CSV rows are rendered as whitespace-separated
//! cells so that the word-based chunker sees every value.

use lopdf::Document;

use crate::domain::errors::ExtractionError;
use crate::domain::models::DocumentKind;

/// Stateless text extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub const fn new() -> Self {
        Self
    }

    /// Extract trimmed plain text. Unsupported kinds yield an empty string.
    pub fn extract(&self, kind: DocumentKind, bytes: &[u8]) -> Result<String, ExtractionError> {
        let text = match kind {
            DocumentKind::Pdf => extract_pdf(bytes)?,
            DocumentKind::PlainText | DocumentKind::Markdown => {
                String::from_utf8_lossy(bytes).into_owned()
            }
            DocumentKind::Csv => render_csv(&String::from_utf8_lossy(bytes))?,
            DocumentKind::Unsupported => String::new(),
        };
        Ok(text.trim().to_string())
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    let mut page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    let mut pages = Vec::with_capacity(page_numbers.len());
    for page in page_numbers {
        match doc.extract_text(&[page]) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    pages.push(trimmed.to_string());
                }
            }
            Err(e) => tracing::debug!(page, error = %e, "Skipping unreadable PDF page"),
        }
    }
    Ok(pages.join("\n\n"))
}

/// Render CSV as one line per record, cells separated by spaces.
fn render_csv(text: &str) -> Result<String, ExtractionError> {
    let mut lines = Vec::new();
    for (line_no, record) in split_records(text)?.into_iter().enumerate() {
        let cells: Vec<&str> = record
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if cells.is_empty() {
            tracing::trace!(line_no, "Skipping empty CSV record");
        } else {
            lines.push(cells.join(" "));
        }
    }
    Ok(lines.join("\n"))
}

/// Minimal RFC 4180 reader: quoted fields, doubled quotes, embedded newlines.
fn split_records(text: &str) -> Result<Vec<Vec<String>>, ExtractionError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ExtractionError::Csv("unterminated quoted field".to_string()));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
