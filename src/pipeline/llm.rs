//! Model gateway: send one extraction prompt to the right backend.
//!
//! Model ids starting with `gemini` go straight to the Gemini endpoint;
//! every other id is handed to the OpenRouter routing endpoint, which
//! forwards to whichever vendor serves that model. Both are reached through
//! `edgequake-llm` providers behind the [`ModelClient`] seam, so the retry,
//! timeout and telemetry logic here can be tested without network access.
//!
//! ## Retry Strategy
//!
//! Only transient failures ([`DocMetaError::is_transient`]) are retried,
//! with exponential backoff (`retry_backoff_ms * 2^attempt`). A missing API
//! key fails on the first attempt.

use crate::config::ExtractionConfig;
use crate::error::DocMetaError;
use crate::output::TokenUsage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Which endpoint serves a model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Vendor's own generative endpoint (Gemini).
    Direct,
    /// Multi-vendor routing endpoint (OpenRouter).
    Router,
}

impl Backend {
    /// `gemini*` (any case) → [`Backend::Direct`], anything else → [`Backend::Router`].
    pub fn classify(model_id: &str) -> Self {
        let prefix = model_id.trim().get(..6);
        if prefix.is_some_and(|p| p.eq_ignore_ascii_case("gemini")) {
            Backend::Direct
        } else {
            Backend::Router
        }
    }

    /// `edgequake-llm` provider name.
    pub fn provider_name(self) -> &'static str {
        match self {
            Backend::Direct => "gemini",
            Backend::Router => "openrouter",
        }
    }

    /// Environment variable holding this backend's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Backend::Direct => "GEMINI_API_KEY",
            Backend::Router => "OPENROUTER_API_KEY",
        }
    }
}

/// Fail with [`DocMetaError::Authentication`] unless `lookup` yields a
/// non-empty key for `backend`.
pub fn check_credentials(
    backend: Backend,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), DocMetaError> {
    let var = backend.api_key_var();
    match lookup(var) {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(DocMetaError::Authentication {
            service: backend.provider_name().to_string(),
            detail: format!("{var} is not set"),
        }),
    }
}

/// Per-call telemetry context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub filename: String,
    pub file_size: Option<u64>,
    pub page_count: Option<usize>,
}

/// A completed model call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    /// Reply text with any surrounding code fence removed.
    pub content: String,
    pub usage: TokenUsage,
    pub duration_ms: u64,
}

/// Transport seam: one prompt in, one raw reply out.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        backend: Backend,
        model_id: &str,
        prompt: &str,
    ) -> Result<ModelReply, DocMetaError>;
}

/// [`ModelClient`] backed by `edgequake-llm` providers.
#[derive(Debug, Clone)]
pub struct LlmClient {
    temperature: f32,
    max_tokens: usize,
}

impl LlmClient {
    pub fn new(temperature: f32, max_tokens: usize) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn complete(
        &self,
        backend: Backend,
        model_id: &str,
        prompt: &str,
    ) -> Result<ModelReply, DocMetaError> {
        // Keys are read per call so a missing one only fails the documents
        // that actually need that backend.
        check_credentials(backend, |k| std::env::var(k).ok())?;

        let provider = ProviderFactory::create_llm_provider(backend.provider_name(), model_id)
            .map_err(|e| DocMetaError::Upstream {
                service: backend.provider_name().to_string(),
                message: format!("provider setup failed: {e}"),
            })?;

        let messages = vec![ChatMessage::user(prompt)];
        let start = Instant::now();
        let response = provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| DocMetaError::Upstream {
                service: backend.provider_name().to_string(),
                message: e.to_string(),
            })?;

        if response.content.trim().is_empty() {
            return Err(DocMetaError::Upstream {
                service: backend.provider_name().to_string(),
                message: "reply contained no content".to_string(),
            });
        }

        Ok(ModelReply {
            content: response.content,
            usage: TokenUsage {
                prompt_tokens: response.prompt_tokens as u64,
                completion_tokens: response.completion_tokens as u64,
            },
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Retrying, timing, logging front door to a [`ModelClient`].
#[derive(Clone)]
pub struct ModelGateway {
    client: Arc<dyn ModelClient>,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
    response_log_dir: Option<PathBuf>,
}

impl ModelGateway {
    pub fn new(client: Arc<dyn ModelClient>, config: &ExtractionConfig) -> Self {
        Self {
            client,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
            response_log_dir: config.response_log_dir.clone(),
        }
    }

    /// Gateway over [`LlmClient`] using the config's sampling settings.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let client = LlmClient::new(config.temperature, config.max_tokens);
        Self::new(Arc::new(client), config)
    }

    /// Send `prompt` to `model_id` and return the fence-stripped reply.
    pub async fn call_model(
        &self,
        prompt: &str,
        model_id: &str,
        ctx: &CallContext,
    ) -> Result<ModelReply, DocMetaError> {
        let backend = Backend::classify(model_id);
        debug!(
            "Calling {} via {} for {} ({} prompt chars)",
            model_id,
            backend.provider_name(),
            ctx.filename,
            prompt.len()
        );

        let start = Instant::now();
        let mut reply = self.call_with_retries(backend, model_id, prompt, ctx).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.write_response_log(model_id, &ctx.filename, &reply.content).await;

        reply.content = strip_code_fence(&reply.content).to_string();
        reply.duration_ms = duration_ms;

        let echoed = echoed_filename(&reply.content).unwrap_or_else(|| "unknown".to_string());
        info!(
            model = model_id,
            backend = backend.provider_name(),
            file = %ctx.filename,
            echoed_filename = %echoed,
            file_size = ?ctx.file_size,
            page_count = ?ctx.page_count,
            prompt_tokens = reply.usage.prompt_tokens,
            completion_tokens = reply.usage.completion_tokens,
            total_tokens = reply.usage.total_tokens(),
            duration_ms,
            "Model call complete"
        );
        Ok(reply)
    }

    async fn call_with_retries(
        &self,
        backend: Backend,
        model_id: &str,
        prompt: &str,
        ctx: &CallContext,
    ) -> Result<ModelReply, DocMetaError> {
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    ctx.filename, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.client.complete(backend, model_id, prompt);
            let result = match timeout(Duration::from_secs(self.api_timeout_secs), call).await {
                Ok(r) => r,
                Err(_) => Err(DocMetaError::Timeout {
                    operation: format!("Model call for {}", ctx.filename),
                    secs: self.api_timeout_secs,
                }),
            };

            match result {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!("{}: attempt {} failed: {}", ctx.filename, attempt + 1, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn write_response_log(&self, model_id: &str, filename: &str, content: &str) {
        let Some(dir) = &self.response_log_dir else {
            return;
        };
        let path = response_log_path(dir, model_id, filename);
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content).await
        };
        if let Err(e) = write.await {
            warn!("Could not write response log {}: {}", path.display(), e);
        }
    }
}

/// `<dir>/<model-id>/<filename>.json` with path separators neutralised.
pub fn response_log_path(dir: &Path, model_id: &str, filename: &str) -> PathBuf {
    dir.join(sanitize_component(model_id))
        .join(format!("{}.json", sanitize_component(filename)))
}

fn sanitize_component(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Remove one surrounding ```` ``` ```` / ```` ```json ```` fence.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match RE_CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

static RE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""filename"\s*:\s*"([^"]+)""#).unwrap());

/// The `filename` value the model echoed, if any.
pub fn echoed_filename(content: &str) -> Option<String> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(content) {
        if let Some(name) = map.get("filename").and_then(|v| v.as_str()) {
            return Some(name.to_string());
        }
    }
    RE_FILENAME
        .captures(content)
        .map(|c| c[1].to_string())
}
