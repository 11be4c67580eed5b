//! Document fetching into a per-job temporary location.
//!
//! Bodies are streamed to disk chunk by chunk so a large protocol PDF never
//! sits in memory twice. Library URLs go through the Graph `/shares`
//! endpoint with a bearer token; other URLs get a plain GET; anything that
//! is not a URL is treated as a local path and copied.

use crate::error::DocMetaError;
use crate::library::GraphClient;
use crate::pipeline::source::is_url;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Fetches a document to a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the document at `url` to `dest` and return the written path.
    async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf, DocMetaError>;
}

/// HTTP downloader with optional document-library support.
pub struct HttpDownloader {
    http: reqwest::Client,
    timeout_secs: u64,
    library: Option<(Arc<GraphClient>, String)>,
}

impl HttpDownloader {
    pub fn new(timeout_secs: u64) -> Result<Self, DocMetaError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocMetaError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            timeout_secs,
            library: None,
        })
    }

    /// Route URLs containing `marker` through `graph`.
    pub fn with_library(mut self, graph: Arc<GraphClient>, marker: impl Into<String>) -> Self {
        self.library = Some((graph, marker.into()));
        self
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response, DocMetaError> {
        if let Some((graph, marker)) = &self.library {
            if !marker.is_empty() && url.contains(marker.as_str()) {
                debug!("Fetching {} through the library share endpoint", url);
                return graph.get(&graph.share_content_url(url)).await;
            }
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;
        if !response.status().is_success() {
            return Err(DocMetaError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(response)
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> DocMetaError {
        if e.is_timeout() {
            DocMetaError::Timeout {
                operation: format!("Download of {url}"),
                secs: self.timeout_secs,
            }
        } else {
            DocMetaError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf, DocMetaError> {
        if !is_url(url) {
            return copy_local(url, dest).await;
        }

        info!("Downloading {}", url);
        let response = self.fetch(url).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| DocMetaError::io(dest, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.request_error(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DocMetaError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| DocMetaError::io(dest, e))?;

        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(dest.to_path_buf())
    }
}

async fn copy_local(source: &str, dest: &Path) -> Result<PathBuf, DocMetaError> {
    let src = Path::new(source);
    if !src.is_file() {
        return Err(DocMetaError::NotFound {
            what: "File",
            name: source.to_string(),
        });
    }
    let is_pdf_ext = src
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf_ext {
        return Err(DocMetaError::UnsupportedFormat {
            path: src.to_path_buf(),
            detail: "file extension is not .pdf".to_string(),
        });
    }
    tokio::fs::copy(src, dest)
        .await
        .map_err(|e| DocMetaError::io(src, e))?;
    debug!("Copied local file {} to {}", src.display(), dest.display());
    Ok(dest.to_path_buf())
}
