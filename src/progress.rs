//! Progress-callback trait for per-document extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the worker pool processes each document. Callers forward them to
//! a terminal progress bar, a channel, or a job-status table without the
//! library knowing which.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docmeta::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ExtractionProgressCallback for Counter {
//!     fn on_document_complete(&self, name: &str, _total: usize, fields: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{name}: {fields} fields");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each document.
///
/// Implementations must be `Send + Sync`: with a folder reference the
/// per-document methods are called concurrently from every worker. All
/// methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the source has been resolved.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a worker picks up a document.
    fn on_document_start(&self, name: &str, total_documents: usize) {
        let _ = (name, total_documents);
    }

    /// Called when a document produced an extraction result.
    ///
    /// `field_count` includes the system-added `Document URL` / `File Name`.
    fn on_document_complete(&self, name: &str, total_documents: usize, field_count: usize) {
        let _ = (name, total_documents, field_count);
    }

    /// Called when a document ended as a failure record.
    fn on_document_error(&self, name: &str, total_documents: usize, error: &str) {
        let _ = (name, total_documents, error);
    }

    /// Called once after every outcome has been aggregated.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        batch_total: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_documents: usize) {
            self.batch_total.store(total_documents, Ordering::SeqCst);
        }

        fn on_document_start(&self, _name: &str, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _name: &str, _total: usize, _fields: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _name: &str, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_start("a.pdf", 2);
        cb.on_document_complete("a.pdf", 2, 5);
        cb.on_document_error("b.pdf", 2, "download failed");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb: Arc<TrackingCallback> = Arc::default();
        let dyn_cb: ProgressCallback = cb.clone();

        dyn_cb.on_batch_start(3);
        dyn_cb.on_document_start("a.pdf", 3);
        dyn_cb.on_document_complete("a.pdf", 3, 4);
        dyn_cb.on_document_start("b.pdf", 3);
        dyn_cb.on_document_error("b.pdf", 3, "timeout");

        assert_eq!(cb.batch_total.load(Ordering::SeqCst), 3);
        assert_eq!(cb.starts.load(Ordering::SeqCst), 2);
        assert_eq!(cb.completes.load(Ordering::SeqCst), 1);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    }
}
