//! # Admit Card Pipeline
//!
//! The one operation the bot needs: turn a form number into an admit card.
//! Validates input, asks an [`AdmitCardSource`] for the document, extracts
//! the student details and hands both back. Every internal failure comes out
//! as an [`AdmitCardError`], and no file is left behind when a request fails.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::admit_card_model::{AdmitCard, DownloadedDocument, FormNumber, StudentRecord};
use crate::errors::{AdmitCardError, RetrievalError};
use crate::text_processing::StudentRecordExtractor;

/// Something that can fetch an admit card document for a form number
pub trait AdmitCardSource: Send + Sync {
    /// Save the document for `form_number` at `destination`.
    ///
    /// On error, implementations must not leave a finished document at
    /// `destination`.
    fn fetch(
        &self,
        form_number: &FormNumber,
        destination: &Path,
    ) -> impl Future<Output = Result<(), RetrievalError>> + Send;
}

/// Retrieval plus extraction, with cleanup on every exit path
pub struct AdmitCardService<S> {
    source: S,
    extractor: StudentRecordExtractor,
    download_dir: PathBuf,
}

impl<S: AdmitCardSource> AdmitCardService<S> {
    pub fn new(source: S, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            extractor: StudentRecordExtractor::new(),
            download_dir: download_dir.into(),
        }
    }

    pub fn with_extractor(mut self, extractor: StudentRecordExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Where the document for a form number is stored while being served
    pub fn document_path(&self, form_number: &FormNumber) -> PathBuf {
        self.download_dir.join(form_number.document_file_name())
    }

    /// Validate raw user input, then retrieve and describe the admit card
    pub async fn lookup(&self, input: &str) -> Result<AdmitCard, AdmitCardError> {
        let form_number = FormNumber::parse(input).inspect_err(|_| {
            debug!(input_length = input.len(), "Rejected non-numeric form number");
        })?;
        self.retrieve(&form_number).await
    }

    /// Retrieve the admit card for an already validated form number
    pub async fn retrieve(&self, form_number: &FormNumber) -> Result<AdmitCard, AdmitCardError> {
        tokio::fs::create_dir_all(&self.download_dir).await.map_err(|e| {
            error!(dir = %self.download_dir.display(), error = %e, "Cannot create download directory");
            AdmitCardError::RetrievalFailed(format!("download directory unavailable: {e}"))
        })?;

        let destination = self.document_path(form_number);
        // Leftover from an interrupted earlier request
        remove_if_present(&destination).await;

        if let Err(e) = self.source.fetch(form_number, &destination).await {
            remove_if_present(&destination).await;
            let outcome = AdmitCardError::from(e);
            warn!(%form_number, error = %outcome, "Admit card not obtained");
            return Err(outcome);
        }

        let document = DownloadedDocument::new(destination);
        match tokio::fs::metadata(document.path()).await {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => {
                return Err(AdmitCardError::RetrievalFailed("retrieved document is empty".to_string()));
            }
            Err(e) => {
                return Err(AdmitCardError::RetrievalFailed(format!("retrieved document missing: {e}")));
            }
        }

        let record = self.extract(document.path()).await;
        info!(%form_number, fields_found = record.found_count(), "Admit card ready");

        Ok(AdmitCard {
            form_number: form_number.clone(),
            document,
            record,
        })
    }

    /// PDF parsing is CPU-bound, so it runs on the blocking pool
    async fn extract(&self, path: &Path) -> StudentRecord {
        let extractor = self.extractor.clone();
        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || extractor.extract_from_document(&path)).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Extraction task failed, using empty record");
                StudentRecord::not_found()
            }
        }
    }
}

impl<S: AdmitCardSource> AdmitCardSource for Arc<S> {
    fn fetch(
        &self,
        form_number: &FormNumber,
        destination: &Path,
    ) -> impl Future<Output = Result<(), RetrievalError>> + Send {
        (**self).fetch(form_number, destination)
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed stale document"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!(path = %path.display(), error = %e, "Failed to remove document"),
    }
}
