//! Report sinks: where successful extraction results are recorded.

use crate::error::DocMetaError;
use crate::output::ExtractionResult;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Receives every successful result of a batch.
pub trait ReportSink: Send + Sync {
    fn record(
        &self,
        result: &ExtractionResult,
        document_url: &str,
        template_id: &str,
    ) -> Result<(), DocMetaError>;
}

#[derive(Serialize)]
struct ReportLine<'a> {
    template_id: &'a str,
    document_url: &'a str,
    recorded_at: u64,
    metadata: &'a ExtractionResult,
}

/// Appends one JSON object per result to a file.
#[derive(Debug)]
pub struct JsonlReportSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlReportSink {
    /// Sink appending to `path`; the file and its parent are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonlReportSink {
    fn record(
        &self,
        result: &ExtractionResult,
        document_url: &str,
        template_id: &str,
    ) -> Result<(), DocMetaError> {
        let line = ReportLine {
            template_id,
            document_url,
            recorded_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            metadata: result,
        };
        let mut json = serde_json::to_string(&line)
            .map_err(|e| DocMetaError::Internal(format!("report serialisation: {e}")))?;
        json.push('\n');

        // One writer at a time keeps lines whole.
        let _guard = self
            .lock
            .lock()
            .map_err(|_| DocMetaError::Internal("report sink lock poisoned".into()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DocMetaError::io(parent, e))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DocMetaError::io(&self.path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| DocMetaError::io(&self.path, e))?;
        debug!("Recorded {} in {}", document_url, self.path.display());
        Ok(())
    }
}
