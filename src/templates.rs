//! Extraction templates: the ordered list of fields the model is asked for.
//!
//! Templates are stored one per file as `<dir>/<id>.json`:
//!
//! ```json
//! {
//!   "id": "clinical",
//!   "name": "Clinical study",
//!   "description": "Core protocol metadata",
//!   "metadataFields": [
//!     {"name": "Sponsor", "description": "Organisation funding the study"}
//!   ]
//! }
//! ```

use crate::error::DocMetaError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A named, described attribute the model is asked to extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub description: String,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A stored extraction template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "metadataFields", default)]
    pub metadata_fields: Vec<FieldDefinition>,
}

/// Source of templates for the orchestrator.
pub trait TemplateStore: Send + Sync {
    /// Fetch a template by id; [`DocMetaError::NotFound`] if unknown.
    fn get_template(&self, template_id: &str) -> Result<Template, DocMetaError>;
}

/// Templates stored as JSON files in one directory.
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    dir: PathBuf,
}

impl FileTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, template_id: &str) -> Result<PathBuf, DocMetaError> {
        // Ids become file names; refuse anything that could escape the directory.
        if template_id.is_empty()
            || template_id.contains(['/', '\\'])
            || template_id.starts_with('.')
        {
            return Err(DocMetaError::NotFound {
                what: "Template",
                name: template_id.to_string(),
            });
        }
        Ok(self.dir.join(format!("{template_id}.json")))
    }

    /// Every readable template in the directory, sorted by id.
    ///
    /// Unparseable files are skipped with a warning.
    pub fn list_templates(&self) -> Result<Vec<Template>, DocMetaError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DocMetaError::io(&self.dir, e)),
        };

        let mut templates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DocMetaError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.get_template(id) {
                Ok(t) => templates.push(t),
                Err(e) => warn!("Skipping template file {}: {}", path.display(), e),
            }
        }
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(templates)
    }

    /// Persist a new template. Fails if a template with the same id exists.
    pub fn save_template(&self, template: &Template) -> Result<(), DocMetaError> {
        let path = self.path_for(&template.id)?;
        if path.exists() {
            return Err(DocMetaError::InvalidConfig(format!(
                "Template with ID {} already exists",
                template.id
            )));
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| DocMetaError::io(&self.dir, e))?;
        let json = serde_json::to_string_pretty(template)
            .map_err(|e| DocMetaError::Internal(format!("template serialisation: {e}")))?;
        std::fs::write(&path, json).map_err(|e| DocMetaError::io(&path, e))?;
        info!("Created template {}", template.id);
        Ok(())
    }
}

impl TemplateStore for FileTemplateStore {
    fn get_template(&self, template_id: &str) -> Result<Template, DocMetaError> {
        let path = self.path_for(template_id)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocMetaError::NotFound {
                    what: "Template",
                    name: template_id.to_string(),
                })
            }
            Err(e) => return Err(DocMetaError::io(&path, e)),
        };
        let mut template: Template = serde_json::from_str(&raw).map_err(|e| {
            DocMetaError::InvalidConfig(format!("template '{template_id}' is malformed: {e}"))
        })?;
        // The file name is authoritative for the id.
        template.id = template_id.to_string();
        debug!(
            "Loaded template {} with {} fields",
            template_id,
            template.metadata_fields.len()
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> Template {
        Template {
            id: id.into(),
            name: "Clinical".into(),
            description: "Study metadata".into(),
            metadata_fields: vec![
                FieldDefinition::new("Sponsor", "Funding organisation"),
                FieldDefinition::new("Study Phase", "I, II, III or IV"),
            ],
        }
    }

    #[test]
    fn save_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTemplateStore::new(dir.path());
        store.save_template(&sample("clinical")).unwrap();

        let t = store.get_template("clinical").unwrap();
        assert_eq!(t.metadata_fields.len(), 2);
        assert_eq!(t.metadata_fields[1].name, "Study Phase");
    }

    #[test]
    fn on_disk_format_uses_metadata_fields_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("t1.json"),
            r#"{"name":"x","description":"y","metadataFields":[{"name":"A","description":"B"}]}"#,
        )
        .unwrap();
        let t = FileTemplateStore::new(dir.path()).get_template("t1").unwrap();
        assert_eq!(t.id, "t1");
        assert_eq!(t.metadata_fields, vec![FieldDefinition::new("A", "B")]);
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileTemplateStore::new(dir.path())
            .get_template("nope")
            .unwrap_err();
        assert!(matches!(err, DocMetaError::NotFound { .. }));
    }

    #[test]
    fn path_traversal_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTemplateStore::new(dir.path());
        assert!(matches!(
            store.get_template("../secrets"),
            Err(DocMetaError::NotFound { .. })
        ));
    }

    #[test]
    fn duplicate_save_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTemplateStore::new(dir.path());
        store.save_template(&sample("dup")).unwrap();
        assert!(store.save_template(&sample("dup")).is_err());
    }

    #[test]
    fn list_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTemplateStore::new(dir.path());
        store.save_template(&sample("b")).unwrap();
        store.save_template(&sample("a")).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let ids: Vec<String> = store
            .list_templates()
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let store = FileTemplateStore::new("/definitely/not/here");
        assert!(store.list_templates().unwrap().is_empty());
    }
}
