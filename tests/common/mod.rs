//! Shared fakes and fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_docmeta::pipeline::llm::Backend;
use edgequake_docmeta::{
    DocMetaError, Downloader, ExtractionConfig, Extractor, FieldDefinition, FolderLister, Job,
    ModelClient, ModelGateway, ModelReply, Template, TemplateStore, TokenUsage,
};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Minimal one-page-per-entry PDF with a Helvetica text layer.
pub fn create_test_pdf(page_texts: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut page_ids = Vec::new();
    for text in page_texts {
        let content = format!(
            "BT /F1 12 Tf 100 700 Td ({}) Tj ET",
            text.replace('\\', "\\\\")
                .replace('(', "\\(")
                .replace(')', "\\)")
        );
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        page_ids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        }));
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(page_texts.len() as i64),
    });
    for id in &page_ids {
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*id) {
            dict.set("Parent", pages_id);
        }
    }
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("serialise test pdf");
    buf
}

// ── Folder lister ────────────────────────────────────────────────────────────

pub struct FakeLister {
    pub jobs: Vec<Job>,
    pub fail: bool,
}

#[async_trait]
impl FolderLister for FakeLister {
    async fn list_documents(&self, folder_ref: &str) -> Result<Vec<Job>, DocMetaError> {
        if self.fail {
            return Err(DocMetaError::NotFound {
                what: "Library folder",
                name: folder_ref.to_string(),
            });
        }
        Ok(self.jobs.clone())
    }
}

// ── Downloader ───────────────────────────────────────────────────────────────

/// Serves bytes by URL; unknown URLs fail like an HTTP 404. Records every
/// destination it wrote so tests can check temp-file cleanup.
#[derive(Default)]
pub struct FakeDownloader {
    pub files: HashMap<String, Vec<u8>>,
    pub written: Mutex<Vec<PathBuf>>,
}

impl FakeDownloader {
    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    pub fn written_paths(&self) -> Vec<PathBuf> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf, DocMetaError> {
        let Some(bytes) = self.files.get(url) else {
            return Err(DocMetaError::DownloadFailed {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            });
        };
        tokio::fs::write(dest, bytes).await.unwrap();
        self.written.lock().unwrap().push(dest.to_path_buf());
        Ok(dest.to_path_buf())
    }
}

// ── Templates ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryTemplates {
    pub templates: HashMap<String, Template>,
}

impl MemoryTemplates {
    pub fn with(mut self, id: &str, fields: &[(&str, &str)]) -> Self {
        self.templates.insert(
            id.to_string(),
            Template {
                id: id.to_string(),
                name: id.to_string(),
                description: String::new(),
                metadata_fields: fields
                    .iter()
                    .map(|(n, d)| FieldDefinition::new(*n, *d))
                    .collect(),
            },
        );
        self
    }
}

impl TemplateStore for MemoryTemplates {
    fn get_template(&self, template_id: &str) -> Result<Template, DocMetaError> {
        self.templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| DocMetaError::NotFound {
                what: "Template",
                name: template_id.to_string(),
            })
    }
}

// ── Model ────────────────────────────────────────────────────────────────────

/// Replies with the first scripted reply whose trigger occurs in the prompt;
/// records every call.
#[derive(Default)]
pub struct FakeModel {
    pub replies: Vec<(String, String)>,
    pub default_reply: String,
    pub calls: Mutex<Vec<(Backend, String, String)>>,
}

impl FakeModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            default_reply: reply.to_string(),
            ..Default::default()
        }
    }

    pub fn when(mut self, prompt_contains: &str, reply: &str) -> Self {
        self.replies
            .push((prompt_contains.to_string(), reply.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for FakeModel {
    async fn complete(
        &self,
        backend: Backend,
        model_id: &str,
        prompt: &str,
    ) -> Result<ModelReply, DocMetaError> {
        self.calls
            .lock()
            .unwrap()
            .push((backend, model_id.to_string(), prompt.to_string()));
        let content = self
            .replies
            .iter()
            .find(|(trigger, _)| prompt.contains(trigger.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.default_reply.clone());
        Ok(ModelReply {
            content,
            usage: TokenUsage {
                prompt_tokens: 50,
                completion_tokens: 10,
            },
            duration_ms: 1,
        })
    }
}

pub fn test_config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .workers(4)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

pub fn extractor(
    config: ExtractionConfig,
    lister: FakeLister,
    downloader: Arc<FakeDownloader>,
    templates: MemoryTemplates,
    model: Arc<FakeModel>,
) -> Extractor {
    let gateway = ModelGateway::new(model, &config);
    Extractor::new(
        config,
        Arc::new(lister),
        downloader,
        Arc::new(templates),
        gateway,
    )
}

pub const FOLDER: &str =
    "https://graph.microsoft.com/v1.0/sites/contoso.sharepoint.com,a,b/drive/root:/Trials";
