//! Text extraction from uploaded files.
//!
//! Every recognised format is turned into plain text before chunking:
//!
//! | Format | Extractor |
//! |--------|-----------|
//! | PDF | `pdf-extract`, pages joined in order |
//! | DOCX | `docx-rs`, one line per paragraph |
//! | XLSX | `calamine`, first worksheet as tab-separated rows |
//! | CSV | `csv`, one `header: value` block per record |
//! | TXT / Markdown | read as UTF-8 |
//!
//! Parsing runs on the blocking thread pool.

use std::fmt::Display;
use std::io::Cursor;
use std::path::Path;

use calamine::{Reader, Xlsx, open_workbook_from_rs};
use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// File formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format (`.pdf`).
    Pdf,
    /// Word document (`.docx`).
    Docx,
    /// Plain text (`.txt`).
    Txt,
    /// Markdown (`.md`, `.markdown`), kept as written.
    Markdown,
    /// Comma-separated values with a header row (`.csv`).
    Csv,
    /// Excel workbook (`.xlsx`).
    Xlsx,
}

impl DocumentFormat {
    /// Detect the format from the lower-cased file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

/// Read the text content of the file at `path`.
///
/// # Errors
///
/// - [`RagError::UnsupportedFormat`] for unknown extensions
/// - [`RagError::Io`] if the file cannot be read
/// - [`RagError::ExtractionError`] if the content does not parse as its format
pub async fn extract_text(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let format = DocumentFormat::from_path(path)
        .ok_or_else(|| RagError::UnsupportedFormat(path.display().to_string()))?;

    let bytes = tokio::fs::read(path).await?;
    let text = tokio::task::spawn_blocking(move || extract_bytes(format, &bytes))
        .await
        .map_err(|e| RagError::ExtractionError(format!("extractor task failed: {e}")))?
        .map_err(|e| {
            error!(path = %path.display(), ?format, error = %e, "extraction failed");
            e
        })?;

    debug!(path = %path.display(), ?format, text_len = text.len(), "extracted text");
    Ok(text)
}

/// Extract text from an in-memory file of the given format.
pub fn extract_bytes(format: DocumentFormat, bytes: &[u8]) -> Result<String> {
    match format {
        DocumentFormat::Pdf => pdf_to_text(bytes),
        DocumentFormat::Docx => docx_to_text(bytes),
        DocumentFormat::Xlsx => xlsx_to_text(bytes),
        DocumentFormat::Csv => csv_to_text(utf8(bytes)?),
        DocumentFormat::Txt | DocumentFormat::Markdown => utf8(bytes).map(str::to_string),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| RagError::ExtractionError(format!("not UTF-8: {e}")))
}

fn pdf_to_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::ExtractionError(format!("invalid PDF: {e}")))
}

/// Join the text runs of every top-level paragraph, one paragraph per line.
fn docx_to_text(bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| RagError::ExtractionError(format!("invalid DOCX: {e}")))?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(paragraph) => Some(paragraph),
            _ => None,
        })
        .map(|paragraph| {
            let mut line = String::new();
            for child in &paragraph.children {
                let ParagraphChild::Run(run) = child else { continue };
                for piece in &run.children {
                    match piece {
                        RunChild::Text(text) => line.push_str(&text.text),
                        RunChild::Tab(_) => line.push('\t'),
                        RunChild::Break(_) => line.push('\n'),
                        _ => {}
                    }
                }
            }
            line
        })
        .collect();
    Ok(paragraphs.join("\n"))
}

fn xlsx_to_text(bytes: &[u8]) -> Result<String> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| RagError::ExtractionError(format!("invalid XLSX: {e}")))?;
    let Some(sheet) = workbook.worksheet_range_at(0) else {
        return Ok(String::new());
    };
    let range = sheet.map_err(|e| RagError::ExtractionError(format!("invalid XLSX: {e}")))?;
    Ok(rows_to_text(range.rows()))
}

/// Render worksheet rows as tab-separated lines, skipping empty rows.
fn rows_to_text<'a, T, I>(rows: I) -> String
where
    T: Display + 'a,
    I: IntoIterator<Item = &'a [T]>,
{
    rows.into_iter()
        .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>().join("\t"))
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render CSV as one `header: value` block per record, blocks separated by a
/// blank line.
///
/// Quoted fields may span lines. Records shorter than the header row render
/// the missing trailing fields as empty values.
pub fn csv_to_text(raw: &str) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| RagError::ExtractionError(format!("invalid CSV: {e}")))?
        .clone();

    let mut blocks = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| RagError::ExtractionError(format!("invalid CSV: {e}")))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let block = headers
            .iter()
            .enumerate()
            .map(|(i, header)| format!("{header}: {}", record.get(i).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(block);
    }
    Ok(blocks.join("\n\n"))
}
