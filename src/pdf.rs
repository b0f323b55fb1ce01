//! # PDF Module
//!
//! Reads the text out of downloaded admit cards. Anything that is not a
//! readable PDF comes back as `ExtractionFailed`.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tracing::{debug, info};

use crate::errors::AdmitCardError;

/// Magic bytes every PDF starts with
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Returns true if the head of a file looks like a PDF
pub fn is_pdf(head: &[u8]) -> bool {
    head.starts_with(PDF_MAGIC)
}

/// Extract the text of every page, in document order, as one string.
///
/// The parser can panic on malformed input; that is reported as an error
/// like any other unreadable document.
pub fn extract_text_from_pdf(path: &Path) -> Result<String, AdmitCardError> {
    info!(path = %path.display(), "Starting PDF text extraction");

    let bytes = std::fs::read(path).map_err(|e| {
        AdmitCardError::ExtractionFailed(format!("cannot read {}: {e}", path.display()))
    })?;

    if !is_pdf(&bytes) {
        return Err(AdmitCardError::ExtractionFailed(format!(
            "{} is not a PDF ({} bytes)",
            path.display(),
            bytes.len()
        )));
    }

    let text = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes)))
        .map_err(|_| AdmitCardError::ExtractionFailed("PDF parser panicked".to_string()))?
        .map_err(|e| AdmitCardError::ExtractionFailed(e.to_string()))?;

    debug!(chars = text.len(), "PDF text extraction completed");
    Ok(text)
}
