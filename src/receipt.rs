// src/receipt.rs

use crate::error::{MatchError, RowFailure};
use crate::search::PageMatcher;
use crate::spreadsheet::write_atomically;
use lopdf::Document;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Share of image-only pages above which a receipt is reported as scanned.
const SCANNED_RATIO: f64 = 0.8;

/// A receipt PDF loaded in memory. The file handle is released as soon as
/// the bytes are read.
pub struct ReceiptDocument {
    path: PathBuf,
    doc: Document,
}

impl ReceiptDocument {
    pub fn open(path: &Path) -> Result<Self, RowFailure> {
        if !path.is_file() {
            return Err(RowFailure::MissingDocument(path.to_path_buf()));
        }
        let unreadable = |reason: String| RowFailure::UnreadableDocument {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| unreadable(e.to_string()))?;
        let doc = Document::load_mem(&bytes).map_err(|e| unreadable(format!("failed to parse PDF: {e}")))?;
        if doc.is_encrypted() {
            return Err(unreadable("PDF is encrypted".to_string()));
        }

        let receipt = Self {
            path: path.to_path_buf(),
            doc,
        };
        if receipt.looks_like_scanned() {
            warn!(path = %path.display(), "Receipt looks scanned / image-only, text search will likely miss");
        }
        Ok(receipt)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Page numbers in document order, 1-based.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.doc.get_pages().keys().copied().collect()
    }

    /// Text of one page. Falls back to pdf-extract on the isolated page when
    /// lopdf yields nothing.
    pub fn page_text(&self, page: u32) -> Option<String> {
        match self.doc.extract_text(&[page]) {
            Ok(text) if !text.trim().is_empty() => return Some(text),
            Ok(_) => debug!(page, "lopdf found no text on page"),
            Err(e) => debug!(page, error = %e, "lopdf text extraction failed"),
        }

        let single = self.single_page_bytes(page).ok()?;
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&single)));
        match extracted {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(page, error = ?e, "pdf-extract failed on page");
                None
            }
            Err(_) => {
                warn!(page, "pdf-extract panicked on page");
                None
            }
        }
    }

    /// First page whose text matches, scanning in order.
    pub fn find_page(&self, matcher: &PageMatcher) -> Option<u32> {
        for page in self.page_numbers() {
            let Some(text) = self.page_text(page) else {
                warn!(page, path = %self.path.display(), "No text extracted from page, skipping");
                continue;
            };
            if matcher.is_match(&text) {
                info!(page, needle = %matcher.needle(), "Match found");
                return Some(page);
            }
        }
        None
    }

    /// A standalone PDF containing only `page`.
    pub fn single_page_bytes(&self, page: u32) -> Result<Vec<u8>, lopdf::Error> {
        let mut single = self.doc.clone();
        let others: Vec<u32> = self.page_numbers().into_iter().filter(|p| *p != page).collect();
        single.delete_pages(&others);
        single.prune_objects();
        single.renumber_objects();
        single.compress();

        let mut out = Vec::new();
        single.save_to(&mut out)?;
        Ok(out)
    }

    /// Heuristic: a page with XObject images but no Font resources is almost
    /// certainly a scan.
    fn looks_like_scanned(&self) -> bool {
        let doc = &self.doc;
        let pages = doc.get_pages();
        if pages.is_empty() {
            return false;
        }

        let mut image_only_pages = 0;
        for object_id in pages.values() {
            let Ok(page_dict) = doc.get_dictionary(*object_id) else {
                continue;
            };
            let resources = page_dict
                .get(b"Resources")
                .ok()
                .and_then(|r| doc.dereference(r).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok());

            let has_entries = |key: &[u8]| {
                resources
                    .and_then(|res| res.get(key).ok())
                    .and_then(|f| doc.dereference(f).ok())
                    .and_then(|(_, resolved)| resolved.as_dict().ok())
                    .is_some_and(|d| !d.is_empty())
            };

            if has_entries(b"XObject") && !has_entries(b"Font") {
                image_only_pages += 1;
            }
        }

        let ratio = image_only_pages as f64 / pages.len() as f64;
        debug!(
            total_pages = pages.len(),
            image_only = image_only_pages,
            ratio = format!("{ratio:.2}"),
            "Scanned-page analysis"
        );
        ratio >= SCANNED_RATIO
    }
}

/// Outcome of saving an extracted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    /// Target already held identical bytes.
    Unchanged,
}

/// Save an extracted page, skipping the write when the file already has the
/// same content.
pub fn write_page(path: &Path, bytes: &[u8]) -> Result<WriteStatus, MatchError> {
    if let Ok(existing) = fs::read(path) {
        if existing == bytes {
            debug!(path = %path.display(), "Extracted page unchanged");
            return Ok(WriteStatus::Unchanged);
        }
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| MatchError::write(dir, e))?;
    }
    write_atomically(path, bytes)?;
    Ok(WriteStatus::Written)
}
