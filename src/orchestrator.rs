//! Batch entry points: resolve a source, run every job, aggregate outcomes.
//!
//! A batch moves through four phases:
//!
//! 1. **Resolve** the template (once) and the source reference into jobs.
//!    Failures here abort the batch with `Err`.
//! 2. **Dispatch** folder jobs to the worker pool; a single document runs
//!    inline on the caller's task.
//! 3. **Process** each job: download → extract → prompt → model → parse.
//!    Any error becomes a [`FailureRecord`] for that job only.
//! 4. **Aggregate** outcomes into a [`BatchResult`], feed successes to the
//!    report sink and fire the final progress event.

use crate::config::ExtractionConfig;
use crate::error::DocMetaError;
use crate::library::{FolderLister, GraphClient};
use crate::output::{
    BatchResult, BatchStats, DocumentOutcome, ExtractionResult, FailureRecord, Job, TokenUsage,
    DOCUMENT_URL_KEY, FILE_NAME_KEY,
};
use crate::pipeline::download::{Downloader, HttpDownloader};
use crate::pipeline::extract::extract_text;
use crate::pipeline::llm::{CallContext, ModelGateway};
use crate::pipeline::parse::parse_response;
use crate::pipeline::pool::{process_contained, run_pool, JobOutcome, JobProcessor};
use crate::pipeline::source::{classify, SourceRef};
use crate::progress::ProgressCallback;
use crate::prompts::{build_prompt, job_fields};
use crate::report::ReportSink;
use crate::templates::{FieldDefinition, Template, TemplateStore};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The extraction pipeline with its collaborators.
pub struct Extractor {
    config: ExtractionConfig,
    lister: Arc<dyn FolderLister>,
    downloader: Arc<dyn Downloader>,
    templates: Arc<dyn TemplateStore>,
    gateway: ModelGateway,
    report_sink: Option<Arc<dyn ReportSink>>,
}

impl Extractor {
    /// Assemble an extractor from explicit collaborators.
    pub fn new(
        config: ExtractionConfig,
        lister: Arc<dyn FolderLister>,
        downloader: Arc<dyn Downloader>,
        templates: Arc<dyn TemplateStore>,
        gateway: ModelGateway,
    ) -> Self {
        Self {
            config,
            lister,
            downloader,
            templates,
            gateway,
            report_sink: None,
        }
    }

    /// Production wiring: Graph folder listing, HTTP downloads (library URLs
    /// through Graph) and `edgequake-llm` model access.
    ///
    /// No credentials are needed to construct it.
    pub fn from_config(
        config: ExtractionConfig,
        templates: Arc<dyn TemplateStore>,
    ) -> Result<Self, DocMetaError> {
        let graph = Arc::new(GraphClient::new(config.download_timeout_secs)?);
        let downloader = HttpDownloader::new(config.download_timeout_secs)?
            .with_library(Arc::clone(&graph), config.library_marker.clone());
        let gateway = ModelGateway::from_config(&config);
        Ok(Self::new(
            config,
            graph,
            Arc::new(downloader),
            templates,
            gateway,
        ))
    }

    /// Record every successful result in `sink`.
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// The jobs `source` expands to, without processing them.
    pub async fn get_files_to_process(&self, source: &str) -> Result<Vec<Job>, DocMetaError> {
        match classify(source, &self.config.library_marker) {
            SourceRef::Single(job) => Ok(vec![job]),
            SourceRef::Folder(folder) => self.lister.list_documents(&folder).await,
        }
    }

    /// Extract `template_id`'s fields from every document in `source` with
    /// `model_id`.
    ///
    /// # Errors
    /// Only for batch-fatal problems: unknown template, or a folder that
    /// cannot be listed. Per-document failures are reported inside the
    /// returned [`BatchResult`].
    pub async fn process_documents(
        &self,
        source: &str,
        template_id: &str,
        model_id: &str,
    ) -> Result<BatchResult, DocMetaError> {
        let start = Instant::now();
        info!("Starting extraction: {} (template {}, model {})", source, template_id, model_id);

        // ── Resolve ──────────────────────────────────────────────────────────
        let template = self.lookup_template(template_id).await?;
        let source_ref = classify(source, &self.config.library_marker);
        let (jobs, inline) = match source_ref {
            SourceRef::Single(job) => (vec![job], true),
            SourceRef::Folder(folder) => (self.lister.list_documents(&folder).await?, false),
        };
        let total = jobs.len();
        if total == 0 {
            warn!("No documents found in {}", source);
        }
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let runner = Arc::new(JobRunner {
            downloader: Arc::clone(&self.downloader),
            gateway: self.gateway.clone(),
            template_fields: template.metadata_fields,
            model_id: model_id.to_string(),
            progress: self.config.progress_callback.clone(),
            total,
        });

        // ── Dispatch & process ───────────────────────────────────────────────
        let job_outcomes = if inline {
            let mut out = Vec::with_capacity(total);
            for job in jobs {
                out.push(process_contained(runner.as_ref(), job).await);
            }
            out
        } else {
            debug!("Dispatching {} jobs to {} workers", total, self.config.workers);
            run_pool(jobs, self.config.workers, runner).await
        };

        // ── Aggregate ────────────────────────────────────────────────────────
        let mut usage = TokenUsage::default();
        let mut outcomes = Vec::with_capacity(job_outcomes.len());
        for jo in job_outcomes {
            usage += jo.usage;
            outcomes.push(jo.outcome);
        }

        self.record_results(&outcomes, template_id).await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let stats = BatchStats {
            total_documents: total,
            succeeded,
            failed: outcomes.len() - succeeded,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_complete(total, succeeded);
        }
        info!(
            "Extraction complete: {}/{} documents succeeded, {} tokens, {}ms",
            stats.succeeded,
            stats.total_documents,
            usage.total_tokens(),
            stats.duration_ms
        );

        Ok(BatchResult { outcomes, stats })
    }

    /// Template stores may touch the disk; keep that off the async workers.
    async fn lookup_template(&self, template_id: &str) -> Result<Template, DocMetaError> {
        let templates = Arc::clone(&self.templates);
        let id = template_id.to_string();
        tokio::task::spawn_blocking(move || templates.get_template(&id))
            .await
            .map_err(|e| DocMetaError::Internal(format!("Template lookup task failed: {e}")))?
    }

    /// Feed every success to the report sink on the blocking pool. Sink
    /// errors are logged and never fail the batch.
    async fn record_results(&self, outcomes: &[DocumentOutcome], template_id: &str) {
        let Some(sink) = self.report_sink.clone() else {
            return;
        };
        let results: Vec<ExtractionResult> = outcomes
            .iter()
            .filter_map(|o| match o {
                DocumentOutcome::Extracted(r) => Some(r.clone()),
                DocumentOutcome::Failed(_) => None,
            })
            .collect();
        if results.is_empty() {
            return;
        }
        let template_id = template_id.to_string();

        let recorded = tokio::task::spawn_blocking(move || {
            for result in &results {
                let url = result.document_url().unwrap_or_default();
                if let Err(e) = sink.record(result, url, &template_id) {
                    warn!("Could not record result for {}: {}", url, e);
                }
            }
        })
        .await;
        if let Err(e) = recorded {
            warn!("Report sink task failed: {}", e);
        }
    }
}

/// Per-batch state shared by all workers.
struct JobRunner {
    downloader: Arc<dyn Downloader>,
    gateway: ModelGateway,
    template_fields: Vec<FieldDefinition>,
    model_id: String,
    progress: Option<ProgressCallback>,
    total: usize,
}

impl JobRunner {
    async fn run(&self, job: &Job) -> Result<(ExtractionResult, TokenUsage), DocMetaError> {
        // Removed on drop, whichever way this function exits.
        let workdir = tempfile::Builder::new()
            .prefix("docmeta-")
            .tempdir()
            .map_err(|e| DocMetaError::Internal(format!("temp dir: {e}")))?;
        let dest = workdir.path().join(local_file_name(&job.name));

        let path = self.downloader.download(&job.url, &dest).await?;
        let file_size = tokio::fs::metadata(&path).await.ok().map(|m| m.len());

        let extracted = extract_text(&path, &job.name).await?;
        debug!(
            "{}: {} chars over {} pages",
            job.name,
            extracted.text.len(),
            extracted.page_count
        );

        let fields = job_fields(&job.name, &self.template_fields);
        let prompt = build_prompt(&extracted.text, &fields);

        let ctx = CallContext {
            filename: job.name.clone(),
            file_size,
            page_count: Some(extracted.page_count),
        };
        let reply = self.gateway.call_model(&prompt, &self.model_id, &ctx).await?;

        let mut metadata = parse_response(&reply.content, &extracted.text);
        metadata.insert(DOCUMENT_URL_KEY.to_string(), Value::String(job.url.clone()));
        metadata.insert(FILE_NAME_KEY.to_string(), Value::String(job.name.clone()));

        Ok((ExtractionResult::new(metadata), reply.usage))
    }
}

#[async_trait]
impl JobProcessor for JobRunner {
    async fn process(&self, job: Job) -> JobOutcome {
        if let Some(cb) = &self.progress {
            cb.on_document_start(&job.name, self.total);
        }

        match self.run(&job).await {
            Ok((result, usage)) => {
                if let Some(cb) = &self.progress {
                    cb.on_document_complete(&job.name, self.total, result.fields.len());
                }
                JobOutcome {
                    outcome: DocumentOutcome::Extracted(result),
                    usage,
                }
            }
            Err(e) => {
                let error = e.to_string();
                warn!("{}: {}", job.name, error);
                if let Some(cb) = &self.progress {
                    cb.on_document_error(&job.name, self.total, &error);
                }
                JobOutcome {
                    outcome: DocumentOutcome::Failed(FailureRecord {
                        error,
                        file: job.name,
                    }),
                    usage: TokenUsage::default(),
                }
            }
        }
    }
}

/// File name for the downloaded copy: the job name's stem stripped of path
/// separators, always with a `.pdf` extension. Whether the bytes really are a
/// PDF is decided by the extractor's magic-byte check, not by the URL.
fn local_file_name(job_name: &str) -> PathBuf {
    let base: String = job_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let stem = Path::new(base.trim_matches('.'))
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    PathBuf::from(format!("{stem}.pdf"))
}
