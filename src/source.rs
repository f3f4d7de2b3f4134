// src/source.rs

use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Lazily produced page texts of one document.
pub type Pages = Box<dyn Iterator<Item = String> + Send>;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse PDF {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Anything that can yield the text of a report, one page at a time.
///
/// Calling `pages` again re-opens the document from the start.
pub trait DocumentSource: Send + Sync {
    fn pages(&self) -> Result<Pages, SourceError>;

    /// Short description for logs and reports.
    fn describe(&self) -> String;
}

/// Pick a source implementation from the file extension.
pub fn open_source(path: impl AsRef<Path>) -> Result<Box<dyn DocumentSource>, SourceError> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => Ok(Box::new(PdfSource::new(path))),
        "txt" => Ok(Box::new(TextSource::new(path))),
        _ => Err(SourceError::UnsupportedFormat(path.to_path_buf())),
    }
}

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

/// A PDF report with embedded text.
#[derive(Debug, Clone)]
pub struct PdfSource {
    path: PathBuf,
}

impl PdfSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for PdfSource {
    fn pages(&self) -> Result<Pages, SourceError> {
        let bytes = fs::read(&self.path).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        pdf_pages(&bytes).map_err(|reason| SourceError::Unreadable {
            path: self.path.clone(),
            reason,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Per-page text from raw PDF bytes.
///
/// Text is pulled page by page with lopdf; if that yields nothing at all the
/// whole document goes through pdf-extract as a single page.
pub fn pdf_pages(pdf_bytes: &[u8]) -> Result<Pages, String> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| format!("Failed to parse PDF: {e}"))?;

    if looks_like_scanned(&doc) {
        warn!("PDF looks scanned / image-only; no text will be found without OCR");
    }

    let texts: Vec<String> = doc
        .get_pages()
        .keys()
        .map(|&n| match doc.extract_text(&[n]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = n, error = %e, "Page text extraction failed");
                String::new()
            }
        })
        .collect();

    if texts.iter().all(|t| t.trim().is_empty()) {
        match pdf_extract::extract_text_from_mem(pdf_bytes) {
            Ok(text) if !text.trim().is_empty() => {
                info!(chars = text.len(), "Fell back to pdf-extract whole-document text");
                return Ok(Box::new(std::iter::once(text)));
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "pdf-extract fallback failed"),
        }
    }

    info!(pages = texts.len(), "PDF text extracted");
    Ok(Box::new(texts.into_iter()))
}

/// Heuristic: a page with XObject images but no Font resources is almost
/// certainly a scan. Treat the document as scanned when ≥80% of pages are.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Ok(page_dict) = page_obj.as_dict() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let non_empty = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|o| doc.dereference(o).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if non_empty(b"XObject".as_slice()) && !non_empty(b"Font".as_slice()) {
            image_only_pages += 1;
        }
    }

    let ratio = image_only_pages as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );
    ratio >= 0.8
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

/// A text dump of a report; pages are separated by form feeds, as
/// `pdftotext` writes them.
#[derive(Debug, Clone)]
pub struct TextSource {
    path: PathBuf,
}

impl TextSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for TextSource {
    fn pages(&self) -> Result<Pages, SourceError> {
        let content = fs::read_to_string(&self.path).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })?;
        let pages: Vec<String> = content.split('\x0c').map(str::to_string).collect();
        Ok(Box::new(pages.into_iter()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
