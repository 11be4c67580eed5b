//! Text extraction: local PDF → plain text for the prompt.
//!
//! lopdf parsing is CPU-bound and synchronous, so the work runs on the
//! blocking pool via `tokio::task::spawn_blocking`.
//!
//! The returned text always starts with `filename: <name>` followed by a
//! blank line. Many documents never mention their own file name, and the
//! model is asked to echo it back.

use crate::error::DocMetaError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Text pulled out of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// `filename: <name>\n\n` followed by the page texts in page order.
    pub text: String,
    pub page_count: usize,
}

/// Extract the text of the PDF at `path`, labelled with `display_name`.
pub async fn extract_text(path: &Path, display_name: &str) -> Result<ExtractedText, DocMetaError> {
    let path = path.to_path_buf();
    let name = display_name.to_string();
    tokio::task::spawn_blocking(move || extract_text_blocking(&path, &name))
        .await
        .map_err(|e| DocMetaError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Synchronous body of [`extract_text`].
pub fn extract_text_blocking(path: &Path, display_name: &str) -> Result<ExtractedText, DocMetaError> {
    check_pdf(path)?;

    let doc = lopdf::Document::load(path).map_err(|e| DocMetaError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    // get_pages is a BTreeMap keyed by page number, already in order.
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut body = String::new();
    for page in &pages {
        let page_text = doc.extract_text(&[*page]).unwrap_or_default();
        body.push_str(&page_text);
        if !page_text.ends_with('\n') {
            body.push('\n');
        }
    }

    if body.trim().is_empty() {
        return Err(DocMetaError::EmptyContent {
            name: display_name.to_string(),
        });
    }

    debug!(
        "Extracted {} chars from {} pages of {}",
        body.len(),
        pages.len(),
        display_name
    );

    Ok(ExtractedText {
        text: format!("filename: {display_name}\n\n{body}"),
        page_count: pages.len(),
    })
}

/// Existence, extension and magic-byte checks.
fn check_pdf(path: &Path) -> Result<(), DocMetaError> {
    if !path.is_file() {
        return Err(DocMetaError::NotFound {
            what: "File",
            name: path.display().to_string(),
        });
    }

    let is_pdf_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf_ext {
        return Err(unsupported(path, "file extension is not .pdf"));
    }

    let mut magic = [0u8; 4];
    let mut f = std::fs::File::open(path).map_err(|e| DocMetaError::io(path, e))?;
    if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(unsupported(path, "missing %PDF header"));
    }
    Ok(())
}

fn unsupported(path: &Path, detail: &str) -> DocMetaError {
    DocMetaError::UnsupportedFormat {
        path: PathBuf::from(path),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// Minimal PDF with one page per entry; an empty entry yields a page with
    /// no text operators.
    fn pdf_with_pages(page_texts: &[&str]) -> Vec<u8> {
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
            let content = if text.is_empty() {
                String::new()
            } else {
                format!(
                    "BT /F1 12 Tf 100 700 Td ({}) Tj ET",
                    text.replace('\\', "\\\\")
                        .replace('(', "\\(")
                        .replace(')', "\\)")
                )
            };
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
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[tokio::test]
    async fn text_is_prefixed_with_filename() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(&dir, "doc.pdf", &pdf_with_pages(&["Sponsor: Acme Corp"]));

        let out = extract_text(&p, "doc.pdf").await.unwrap();
        assert!(out.text.starts_with("filename: doc.pdf\n\n"), "{}", out.text);
        assert!(out.text.contains("Sponsor: Acme Corp"));
        assert_eq!(out.page_count, 1);
    }

    #[tokio::test]
    async fn pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(&dir, "multi.PDF", &pdf_with_pages(&["Alpha", "Bravo", "Charlie"]));

        let out = extract_text(&p, "multi.PDF").await.unwrap();
        let a = out.text.find("Alpha").unwrap();
        let b = out.text.find("Bravo").unwrap();
        let c = out.text.find("Charlie").unwrap();
        assert!(a < b && b < c);
        assert_eq!(out.page_count, 3);
    }

    #[tokio::test]
    async fn missing_file() {
        let err = extract_text(Path::new("/no/such/file.pdf"), "file.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, DocMetaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn wrong_extension_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(&dir, "doc.docx", &pdf_with_pages(&["x"]));
        let err = extract_text(&p, "doc.docx").await.unwrap_err();
        assert!(matches!(err, DocMetaError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn bad_magic_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(&dir, "fake.pdf", b"<html>not a pdf</html>");
        let err = extract_text(&p, "fake.pdf").await.unwrap_err();
        assert!(matches!(err, DocMetaError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn truncated_pdf_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(&dir, "broken.pdf", b"%PDF-1.4\n%garbage");
        let err = extract_text(&p, "broken.pdf").await.unwrap_err();
        assert!(matches!(err, DocMetaError::CorruptPdf { .. }));
    }

    #[tokio::test]
    async fn textless_pdf_is_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(&dir, "scan.pdf", &pdf_with_pages(&[""]));
        let err = extract_text(&p, "scan.pdf").await.unwrap_err();
        assert!(matches!(err, DocMetaError::EmptyContent { .. }));
    }
}
