//! # edgequake-docmeta
//!
//! Extract structured metadata from PDF documents with Large Language Models.
//!
//! ## Why this crate?
//!
//! Regulatory and clinical document sets carry the same handful of facts
//! (sponsor, study phase, product name, dates) buried in hundreds of pages
//! with no consistent layout. Rule-based extractors break on every new
//! template. This crate sends each document's text to an LLM together with a
//! list of named, described fields and turns the free-text reply, however
//! messy, into a clean key/value record.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source reference
//!  │
//!  ├─ 1. Resolve   one URL/path → one job; library folder → many jobs
//!  ├─ 2. Fetch     stream each document into a per-job temp directory
//!  ├─ 3. Extract   PDF text layer via lopdf (spawn_blocking)
//!  ├─ 4. Prompt    template fields + text → one exhaustive instruction
//!  ├─ 5. Model     gemini-* direct, everything else via OpenRouter
//!  ├─ 6. Parse     JSON → braces → key: value lines, plus source recovery
//!  └─ 7. Collect   one outcome per job, in completion order
//! ```
//!
//! Folder references run on a pool of `workers` tasks (default 4); a single
//! document runs inline.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docmeta::{ExtractionConfig, Extractor, FileTemplateStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let templates = Arc::new(FileTemplateStore::new("templates"));
//!     let extractor = Extractor::from_config(ExtractionConfig::default(), templates)?;
//!
//!     // Needs OPENROUTER_API_KEY (or GEMINI_API_KEY for gemini-* models)
//!     let batch = extractor
//!         .process_documents("https://example.org/protocol.pdf", "clinical", "openai/gpt-4o-mini")
//!         .await?;
//!     for result in batch.successes() {
//!         println!("{}", serde_json::to_string_pretty(result)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docmeta` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docmeta = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod library;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_LIBRARY_MARKER};
pub use error::DocMetaError;
pub use library::{FolderLister, GraphClient, LibraryCredentials};
pub use orchestrator::Extractor;
pub use output::{
    BatchResult, BatchStats, DocumentOutcome, ExtractionResult, FailureRecord, Job, Metadata,
    TokenUsage, DOCUMENT_URL_KEY, FILE_NAME_KEY, NOT_FOUND,
};
pub use pipeline::download::{Downloader, HttpDownloader};
pub use pipeline::extract::{extract_text, ExtractedText};
pub use pipeline::llm::{Backend, CallContext, LlmClient, ModelClient, ModelGateway, ModelReply};
pub use pipeline::parse::parse_response;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::build_prompt;
pub use report::{JsonlReportSink, ReportSink};
pub use templates::{FieldDefinition, FileTemplateStore, Template, TemplateStore};
