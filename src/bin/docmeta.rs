//! CLI binary for edgequake-docmeta.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docmeta::{
    BatchResult, DocumentOutcome, ExtractionConfig, ExtractionProgressCallback, Extractor,
    FileTemplateStore, JsonlReportSink, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── Terminal styling ─────────────────────────────────────────────────────────

const GREEN: u8 = 32;
const RED: u8 = 31;
const CYAN: u8 = 36;
const BOLD: u8 = 1;
const DIM: u8 = 2;

/// Wrap `s` in a single SGR attribute.
fn paint(code: u8, s: &str) -> String {
    format!("\x1b[{code}m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished document. Documents
/// finish out of order when several workers run.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us how many documents there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Resolving");
        bar.set_message("Looking up documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, name: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(name))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.activate_bar(total_documents);
        self.bar.println(format!(
            "{} {}",
            paint(CYAN, "◆"),
            paint(BOLD, &format!("Extracting metadata from {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, name: &str, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(name.to_string(), Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, name: &str, _total: usize, field_count: usize) {
        let secs = self.elapsed_secs(name);
        self.bar.println(format!(
            "  {} {:<40}  {:<10}  {}",
            paint(GREEN, "✓"),
            name,
            paint(DIM, &format!("{field_count:>3} fields")),
            paint(DIM, &format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, name: &str, _total: usize, error: &str) {
        let secs = self.elapsed_secs(name);

        // Keep long errors on one line.
        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            paint(RED, "✗"),
            name,
            paint(RED, &msg),
            paint(DIM, &format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let failed = total_documents.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents extracted successfully",
                paint(GREEN, "✔"),
                paint(BOLD, &success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents extracted  ({} failed)",
                if failed == total_documents {
                    paint(RED, "✘")
                } else {
                    paint(CYAN, "⚠")
                },
                paint(BOLD, &success_count.to_string()),
                total_documents,
                paint(RED, &failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One document by URL
  docmeta https://example.org/protocol.pdf --template clinical --model openai/gpt-4o-mini

  # A local file, Gemini direct
  docmeta ./protocol.pdf -t clinical -m gemini-2.0-flash

  # Every PDF in a document-library folder, 8 workers, appended to a report
  docmeta "https://graph.microsoft.com/v1.0/sites/contoso.sharepoint.com,.../drive/root:/Trials" \
      -t clinical -m openai/gpt-4o-mini --workers 8 -o report.jsonl

  # Only list what would be processed (no API key needed)
  docmeta "<folder reference>" --list-only

  # Show the available templates
  docmeta --list-templates

MODEL ROUTING:
  gemini-*      sent directly to the Gemini API      (GEMINI_API_KEY)
  anything else sent through OpenRouter              (OPENROUTER_API_KEY)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY             Google Gemini API key
  OPENROUTER_API_KEY         OpenRouter API key
  SHAREPOINT_TENANT_ID       Document-library tenant
  SHAREPOINT_CLIENT_ID       Document-library app id
  SHAREPOINT_CLIENT_SECRET   Document-library app secret

  A .env file in the working directory is loaded on startup.
"#;

/// Extract structured metadata from PDF documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "docmeta",
    version,
    about = "Extract structured metadata from PDF documents using LLMs",
    long_about = "Extract template-defined metadata fields from PDF documents (local files, URLs \
or whole document-library folders) using Large Language Models. gemini-* models are called \
directly; every other model id is routed through OpenRouter.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document URL, local PDF path, or document-library folder reference.
    #[arg(required_unless_present = "list_templates")]
    source: Option<String>,

    /// Template id (file stem in the templates directory).
    #[arg(short, long, env = "DOCMETA_TEMPLATE",
          required_unless_present_any = ["list_only", "list_templates"])]
    template: Option<String>,

    /// Model id, e.g. gemini-2.0-flash or openai/gpt-4o-mini.
    #[arg(short, long, env = "DOCMETA_MODEL",
          required_unless_present_any = ["list_only", "list_templates"])]
    model: Option<String>,

    /// Directory holding `<id>.json` templates.
    #[arg(long, env = "DOCMETA_TEMPLATES_DIR", default_value = "templates")]
    templates_dir: PathBuf,

    /// Concurrent workers for folder references.
    #[arg(short, long, env = "DOCMETA_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Append successful results to this JSON Lines report.
    #[arg(short, long, env = "DOCMETA_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the whole batch (results and stats) as JSON.
    #[arg(long, env = "DOCMETA_JSON")]
    json: bool,

    /// Only print the documents the source resolves to.
    #[arg(long)]
    list_only: bool,

    /// Print the templates in --templates-dir and exit.
    #[arg(long)]
    list_templates: bool,

    /// Save every raw model reply under this directory.
    #[arg(long, env = "DOCMETA_RESPONSE_LOG_DIR")]
    response_log_dir: Option<PathBuf>,

    /// Max model output tokens per document.
    #[arg(long, env = "DOCMETA_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "DOCMETA_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per document on transient model failures.
    #[arg(long, env = "DOCMETA_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Document download timeout in seconds.
    #[arg(long, env = "DOCMETA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-document model call timeout in seconds.
    #[arg(long, env = "DOCMETA_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "DOCMETA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCMETA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCMETA_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let templates = Arc::new(FileTemplateStore::new(&cli.templates_dir));

    // ── List templates ───────────────────────────────────────────────────
    if cli.list_templates {
        let all = templates
            .list_templates()
            .context("Failed to list templates")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&all).context("Failed to serialise templates")?
            );
        } else if all.is_empty() {
            eprintln!("No templates in {}", cli.templates_dir.display());
        } else {
            for t in &all {
                println!(
                    "{:<24} {:>3} fields  {}",
                    paint(BOLD, &t.id),
                    t.metadata_fields.len(),
                    paint(DIM, &t.name)
                );
            }
        }
        return Ok(());
    }

    let source = cli
        .source
        .clone()
        .context("A source reference is required")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let mut extractor =
        Extractor::from_config(config, templates).context("Failed to set up extractor")?;

    // ── List-only mode ───────────────────────────────────────────────────
    if cli.list_only {
        let jobs = extractor
            .get_files_to_process(&source)
            .await
            .context("Failed to resolve source")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&jobs).context("Failed to serialise job list")?
            );
        } else {
            for job in &jobs {
                println!("{}\t{}", job.name, paint(DIM, &job.url));
            }
            if !cli.quiet {
                eprintln!("{} documents", jobs.len());
            }
        }
        return Ok(());
    }

    if let Some(ref path) = cli.output {
        extractor = extractor.with_report_sink(Arc::new(JsonlReportSink::new(path)));
    }

    // Both are required unless a listing flag is present, which returned above.
    let template = cli.template.as_deref().context("--template is required")?;
    let model = cli.model.as_deref().context("--model is required")?;

    // ── Run extraction ───────────────────────────────────────────────────
    let batch = extractor
        .process_documents(&source, template, model)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&batch).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        print_batch(&batch)?;
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} tokens in  /  {} tokens out  in  {}ms",
            paint(DIM, &batch.stats.prompt_tokens.to_string()),
            paint(DIM, &batch.stats.completion_tokens.to_string()),
            batch.stats.duration_ms,
        );
        if let Some(ref path) = cli.output {
            eprintln!("   report  →  {}", paint(BOLD, &path.display().to_string()));
        }
    }

    Ok(())
}

/// Human-readable rendering: one block per document.
fn print_batch(batch: &BatchResult) -> Result<()> {
    for outcome in &batch.outcomes {
        match outcome {
            DocumentOutcome::Extracted(result) => {
                println!("{}", paint(BOLD, result.file_name().unwrap_or("(unnamed)")));
                for (key, value) in &result.fields {
                    let shown = match value.as_str() {
                        Some(s) => s.to_string(),
                        None => serde_json::to_string(value).context("Failed to render value")?,
                    };
                    println!("  {key}: {shown}");
                }
            }
            DocumentOutcome::Failed(f) => {
                println!("{} {}", paint(RED, "✗"), paint(BOLD, &f.file));
                println!("  error: {}", f.error);
            }
        }
        println!();
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .workers(cli.workers)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref dir) = cli.response_log_dir {
        builder = builder.response_log_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
