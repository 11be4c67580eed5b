//! Configuration for metadata extraction batches.
//!
//! Every knob lives in [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. Credentials are deliberately absent: API keys
//! are read from the environment at call time, so a config (and the
//! [`crate::orchestrator::Extractor`] holding it) can be constructed on a
//! machine that has none.

use crate::error::DocMetaError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Domain marker identifying document-library folder references.
pub const DEFAULT_LIBRARY_MARKER: &str = "sharepoint.com";

/// Configuration for an extraction batch.
///
/// # Example
/// ```rust
/// use edgequake_docmeta::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .workers(8)
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 8);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Size of the worker pool for folder references. Default: 4.
    ///
    /// Each worker holds one document at a time: its temp file, its extracted
    /// text and one in-flight model call. Raise it for large folders if the
    /// model backend's rate limit allows.
    pub workers: usize,

    /// Sampling temperature for the model call. Default: 0.0.
    ///
    /// Extraction wants the same answer every time; any creativity here shows
    /// up as invented values.
    pub temperature: f32,

    /// Maximum tokens the model may generate per document. Default: 4096.
    pub max_tokens: usize,

    /// Retries per document on a transient model failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Download timeout in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-model-call timeout in seconds. Default: 120.
    ///
    /// Whole-document prompts are large; a 60-page protocol can take well over
    /// a minute on slower routed models.
    pub api_timeout_secs: u64,

    /// Substring that marks a source reference as a document-library folder.
    /// Default: [`DEFAULT_LIBRARY_MARKER`].
    pub library_marker: String,

    /// When set, every raw model reply is written to
    /// `<dir>/<model-id>/<file-name>.json`. Default: None.
    pub response_log_dir: Option<PathBuf>,

    /// Per-document progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            library_marker: DEFAULT_LIBRARY_MARKER.to_string(),
            response_log_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("workers", &self.workers)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("library_marker", &self.library_marker)
            .field("response_log_dir", &self.response_log_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn library_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.library_marker = marker.into();
        self
    }

    pub fn response_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.response_log_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, DocMetaError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(DocMetaError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(DocMetaError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DocMetaError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
