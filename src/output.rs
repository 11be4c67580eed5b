//! Result types produced by an extraction batch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key added to every successful result: the URL the document was fetched from.
pub const DOCUMENT_URL_KEY: &str = "Document URL";
/// Key added to every successful result: the document's display name.
pub const FILE_NAME_KEY: &str = "File Name";
/// Sentinel value for a field neither the model nor recovery could fill.
pub const NOT_FOUND: &str = "Not found";

/// Ordered field-name → value mapping as returned by the response parser.
pub type Metadata = Map<String, Value>;

/// A single document to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Display name, usually the file name.
    pub name: String,
    /// Fetch location.
    pub url: String,
}

impl Job {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Successfully parsed metadata for one document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionResult {
    pub fields: Metadata,
}

impl ExtractionResult {
    pub fn new(fields: Metadata) -> Self {
        Self { fields }
    }

    /// Look up a field value as a string, if it is one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn document_url(&self) -> Option<&str> {
        self.get_str(DOCUMENT_URL_KEY)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.get_str(FILE_NAME_KEY)
    }
}

/// Placeholder for a document whose processing did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub error: String,
    pub file: String,
}

/// One entry of a [`BatchResult`].
///
/// Serialised untagged: a success is the bare metadata object, a failure is
/// `{"error": "...", "file": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentOutcome {
    Failed(FailureRecord),
    Extracted(ExtractionResult),
}

impl DocumentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DocumentOutcome::Extracted(_))
    }

    /// The document name this outcome belongs to, when known.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            DocumentOutcome::Extracted(r) => r.file_name(),
            DocumentOutcome::Failed(f) => Some(&f.file),
        }
    }
}

/// Token usage reported by a model backend for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
    }
}

/// Aggregate numbers for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub duration_ms: u64,
}

/// Every outcome of one pipeline invocation, in completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub outcomes: Vec<DocumentOutcome>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.outcomes.iter().filter_map(|o| match o {
            DocumentOutcome::Extracted(r) => Some(r),
            DocumentOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.outcomes.iter().filter_map(|o| match o {
            DocumentOutcome::Failed(f) => Some(f),
            DocumentOutcome::Extracted(_) => None,
        })
    }
}
