//! Error types for the edgequake-docmeta library.
//!
//! A single error enum covers both failure modes of a batch:
//!
//! * **Batch-fatal**: the source reference cannot be resolved or the template
//!   does not exist. Returned as `Err(DocMetaError)` from
//!   [`crate::orchestrator::Extractor::process_documents`].
//!
//! * **Per-document**: download, extraction or the model call failed for one
//!   job. The error is rendered into a [`crate::output::FailureRecord`] and
//!   stored in the batch next to the successful results, so one unreadable
//!   PDF never costs the caller the other forty-nine.
//!
//! The response parser never produces an error: it degrades to an empty
//! mapping instead.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-docmeta library.
#[derive(Debug, Error)]
pub enum DocMetaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A file, template or remote folder does not exist.
    #[error("{what} not found: '{name}'")]
    NotFound { what: &'static str, name: String },

    /// The file exists but is not a supported document type.
    #[error("Unsupported document format for '{path}': {detail}\nOnly PDF files are supported.")]
    UnsupportedFormat { path: PathBuf, detail: String },

    /// The PDF parsed but has no text layer (typically a scanned image).
    #[error("No text could be extracted from '{name}'\nThe PDF may be a scanned image without a text layer.")]
    EmptyContent { name: String },

    /// The PDF header/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── Transport errors ──────────────────────────────────────────────────
    /// HTTP download of a document failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Required credentials are missing or were rejected.
    #[error("Authentication failed for {service}: {detail}")]
    Authentication { service: String, detail: String },

    /// A remote backend (model endpoint, document library) failed or returned
    /// a response we could not understand.
    #[error("Upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

    /// A network call exceeded its deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Local filesystem failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocMetaError {
    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Only transport failures qualify; a missing API key or a corrupt PDF
    /// will fail identically on every attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DocMetaError::Upstream { .. } | DocMetaError::Timeout { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocMetaError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let e = DocMetaError::NotFound {
            what: "Template",
            name: "clinical-v2".into(),
        };
        assert_eq!(e.to_string(), "Template not found: 'clinical-v2'");
    }

    #[test]
    fn empty_content_mentions_scans() {
        let e = DocMetaError::EmptyContent {
            name: "scan.pdf".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("scan.pdf"), "got: {msg}");
        assert!(msg.contains("scanned"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = DocMetaError::Timeout {
            operation: "Model call".into(),
            secs: 120,
        };
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn transient_classification() {
        assert!(DocMetaError::Upstream {
            service: "openrouter".into(),
            message: "502".into()
        }
        .is_transient());
        assert!(DocMetaError::Timeout {
            operation: "x".into(),
            secs: 1
        }
        .is_transient());
        assert!(!DocMetaError::Authentication {
            service: "gemini".into(),
            detail: "GEMINI_API_KEY is not set".into()
        }
        .is_transient());
        assert!(!DocMetaError::EmptyContent { name: "a.pdf".into() }.is_transient());
    }
}
