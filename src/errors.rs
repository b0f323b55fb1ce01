//! # Error Types Module
//!
//! This module defines the error types used by the admit card pipeline.
//! `RetrievalError` describes what went wrong inside the browser automation,
//! `AdmitCardError` is the uniform taxonomy callers and users get to see.

use std::time::Duration;

use thiserror::Error;

/// Stage of a portal retrieval, used to report which bound was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Launching the shared browser and opening a fresh context
    Launch,
    /// Loading the portal until the form number input is ready
    Navigation,
    /// Filling the form number input
    Fill,
    /// Clicking submit and waiting for the download to complete
    Download,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Launch => "launch",
            Stage::Navigation => "navigation",
            Stage::Fill => "fill",
            Stage::Download => "download",
        };
        f.write_str(name)
    }
}

/// Failures inside the retriever. Never shown to end users.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out during {stage} after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("No document was downloaded: {0}")]
    NoDownload(String),

    #[error("Browser session is shut down")]
    SessionClosed,

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetrievalError::Timeout { .. })
    }
}

/// Caller-visible outcome of an admit card request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmitCardError {
    /// Input is not a plain run of decimal digits
    #[error("Invalid form number: {0:?}")]
    InputInvalid(String),
    /// A retrieval stage exceeded its time bound
    #[error("Retrieval timed out: {0}")]
    RetrievalTimeout(String),
    /// The portal produced no document
    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),
    /// The document could not be read; downgraded to an all-sentinel record
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
    /// The document existed but could not be sent back
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

impl AdmitCardError {
    /// Localization key for the message shown to the user.
    ///
    /// Timeouts and failed retrievals share one message: the portal does not
    /// let us tell a wrong form number apart from a broken page.
    pub fn user_message_key(&self) -> &'static str {
        match self {
            AdmitCardError::InputInvalid(_) => "error-input-invalid",
            AdmitCardError::RetrievalTimeout(_) | AdmitCardError::RetrievalFailed(_) => {
                "error-not-found"
            }
            AdmitCardError::ExtractionFailed(_) => "error-extraction",
            AdmitCardError::DeliveryFailed(_) => "error-delivery",
        }
    }
}

impl From<RetrievalError> for AdmitCardError {
    fn from(err: RetrievalError) -> Self {
        if err.is_timeout() {
            AdmitCardError::RetrievalTimeout(err.to_string())
        } else {
            AdmitCardError::RetrievalFailed(err.to_string())
        }
    }
}
