//! Document-library access through Microsoft Graph.
//!
//! A folder reference looks like
//! `https://graph.microsoft.com/v1.0/sites/<site>/drive/root:/<folder path>`.
//! [`GraphClient`] lists the PDF files in that folder (following
//! `@odata.nextLink` pagination) and fetches file contents through the
//! `/shares` endpoint, which accepts the item's web URL directly.
//!
//! Credentials come from `SHAREPOINT_TENANT_ID`, `SHAREPOINT_CLIENT_ID` and
//! `SHAREPOINT_CLIENT_SECRET`. They are read on first use, not at
//! construction, and the resulting app token is cached until shortly before
//! it expires.

use crate::error::DocMetaError;
use crate::output::Job;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";

const SERVICE: &str = "document library";
const FOLDER_SEPARATOR: &str = "/drive/root:/";
// Refresh this long before the token's stated expiry.
const TOKEN_SKEW: Duration = Duration::from_secs(60);

/// Expands a folder reference into one [`Job`] per document.
#[async_trait]
pub trait FolderLister: Send + Sync {
    async fn list_documents(&self, folder_ref: &str) -> Result<Vec<Job>, DocMetaError>;
}

/// App-only credentials for the document library.
#[derive(Clone)]
pub struct LibraryCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for LibraryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl LibraryCredentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, DocMetaError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Read credentials through `lookup`; empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DocMetaError> {
        let get = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DocMetaError::Authentication {
                    service: SERVICE.to_string(),
                    detail: format!("{key} is not set"),
                })
        };
        Ok(Self {
            tenant_id: get("SHAREPOINT_TENANT_ID")?,
            client_id: get("SHAREPOINT_CLIENT_ID")?,
            client_secret: get("SHAREPOINT_CLIENT_SECRET")?,
        })
    }
}

/// A folder reference split into its site prefix and folder path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef {
    /// Everything before `/drive/root:/`, e.g. `https://graph.microsoft.com/v1.0/sites/<site>`.
    pub site_prefix: String,
    /// Folder path inside the drive, without trailing slash or `:/children` suffix.
    pub path: String,
}

impl FolderRef {
    pub fn parse(folder_ref: &str) -> Result<Self, DocMetaError> {
        let invalid = || DocMetaError::NotFound {
            what: "Library folder",
            name: folder_ref.to_string(),
        };
        let (prefix, rest) = folder_ref
            .trim()
            .split_once(FOLDER_SEPARATOR)
            .ok_or_else(invalid)?;
        let path = rest.split(":/").next().unwrap_or(rest).trim_end_matches('/');
        if prefix.is_empty() || path.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            site_prefix: prefix.trim_end_matches('/').to_string(),
            path: path.to_string(),
        })
    }

    pub fn children_url(&self) -> String {
        format!("{}{}{}:/children", self.site_prefix, FOLDER_SEPARATOR, self.path)
    }
}

/// Encode a sharing URL as a Graph share id (`u!` + unpadded base64url).
pub fn share_id(url: &str) -> String {
    format!("u!{}", URL_SAFE_NO_PAD.encode(url.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    name: String,
    #[serde(rename = "webUrl")]
    web_url: Option<String>,
    file: Option<serde_json::Value>,
}

/// PDF jobs on one page of a children listing, plus the next-page link.
fn parse_children_page(body: &str) -> Result<(Vec<Job>, Option<String>), DocMetaError> {
    let page: ChildrenPage = serde_json::from_str(body).map_err(|e| DocMetaError::Upstream {
        service: SERVICE.to_string(),
        message: format!("unexpected folder listing: {e}"),
    })?;
    let jobs = page
        .value
        .into_iter()
        .filter(|item| item.file.is_some() && item.name.to_lowercase().ends_with(".pdf"))
        .filter_map(|item| match item.web_url {
            Some(url) => Some(Job::new(item.name, url)),
            None => {
                warn!("Skipping '{}': no web URL in listing", item.name);
                None
            }
        })
        .collect();
    Ok((jobs, page.next_link))
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Microsoft Graph client for listing and downloading library documents.
pub struct GraphClient {
    http: reqwest::Client,
    graph_base: String,
    login_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl GraphClient {
    /// Client with default endpoints; credentials are read from the
    /// environment on first use.
    pub fn new(timeout_secs: u64) -> Result<Self, DocMetaError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocMetaError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            graph_base: DEFAULT_GRAPH_BASE.to_string(),
            login_base: DEFAULT_LOGIN_BASE.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Override the Graph and login base URLs (sovereign clouds).
    pub fn with_endpoints(mut self, graph_base: impl Into<String>, login_base: impl Into<String>) -> Self {
        self.graph_base = graph_base.into().trim_end_matches('/').to_string();
        self.login_base = login_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Content endpoint for an item identified by its web URL.
    pub fn share_content_url(&self, web_url: &str) -> String {
        format!("{}/shares/{}/driveItem/content", self.graph_base, share_id(web_url))
    }

    async fn access_token(&self) -> Result<String, DocMetaError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let credentials = LibraryCredentials::from_env()?;
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base, credentials.tenant_id
        );
        let scope = format!("{}/.default", graph_origin(&self.graph_base));
        debug!("Requesting library access token");

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(e, "token request"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, "token response"))?;
        if !status.is_success() {
            return Err(DocMetaError::Authentication {
                service: SERVICE.to_string(),
                detail: format!("token request returned HTTP {status}"),
            });
        }
        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| DocMetaError::Upstream {
            service: SERVICE.to_string(),
            message: format!("malformed token response: {e}"),
        })?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SKEW);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// Authenticated GET; non-success statuses are mapped to errors.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, DocMetaError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(e, url))?;
        check_status(response, url)
    }
}

#[async_trait]
impl FolderLister for GraphClient {
    async fn list_documents(&self, folder_ref: &str) -> Result<Vec<Job>, DocMetaError> {
        let folder = FolderRef::parse(folder_ref)?;
        info!("Listing library folder '{}'", folder.path);

        let mut jobs = Vec::new();
        let mut next = Some(folder.children_url());
        let mut pages = 0usize;
        while let Some(url) = next.take() {
            let body = self
                .get(&url)
                .await?
                .text()
                .await
                .map_err(|e| transport_error(e, &url))?;
            let (page_jobs, next_link) = parse_children_page(&body)?;
            jobs.extend(page_jobs);
            next = next_link;
            pages += 1;
        }

        info!(
            "Found {} PDF documents in '{}' ({} pages)",
            jobs.len(),
            folder.path,
            pages
        );
        Ok(jobs)
    }
}

/// `https://graph.microsoft.com/v1.0` → `https://graph.microsoft.com`.
fn graph_origin(graph_base: &str) -> String {
    match reqwest::Url::parse(graph_base) {
        Ok(url) if url.has_host() => url.origin().ascii_serialization(),
        _ => graph_base.to_string(),
    }
}

fn transport_error(e: reqwest::Error, what: &str) -> DocMetaError {
    DocMetaError::Upstream {
        service: SERVICE.to_string(),
        message: format!("{what}: {e}"),
    }
}

fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response, DocMetaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status.as_u16() {
        401 | 403 => DocMetaError::Authentication {
            service: SERVICE.to_string(),
            detail: format!("HTTP {status} for {url}"),
        },
        404 => DocMetaError::NotFound {
            what: "Library item",
            name: url.to_string(),
        },
        _ => DocMetaError::Upstream {
            service: SERVICE.to_string(),
            message: format!("HTTP {status} for {url}"),
        },
    })
}
