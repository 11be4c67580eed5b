//! Source resolution: decide whether a reference names one document or a
//! document-library folder.

use crate::output::Job;
use percent_encoding::percent_decode_str;
use std::path::Path;

/// What a source reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// A document-library folder to be expanded by a folder lister.
    Folder(String),
    /// A single document, processed inline.
    Single(Job),
}

/// Classify `reference`: anything containing `library_marker` is a folder.
pub fn classify(reference: &str, library_marker: &str) -> SourceRef {
    let reference = reference.trim();
    if !library_marker.is_empty() && reference.contains(library_marker) {
        SourceRef::Folder(reference.to_string())
    } else {
        SourceRef::Single(Job::new(job_name_from_url(reference), reference))
    }
}

/// Name given to a URL whose path has no usable segment.
pub const FALLBACK_JOB_NAME: &str = "downloaded.pdf";

/// Last path segment of a URL or local path, without query or fragment.
///
/// URL segments are percent-decoded. Local paths are taken literally.
pub fn job_name_from_url(reference: &str) -> String {
    if is_url(reference) {
        return match reqwest::Url::parse(reference) {
            Ok(parsed) => parsed
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                .map(|last| percent_decode_str(last).decode_utf8_lossy().into_owned())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| FALLBACK_JOB_NAME.to_string()),
            Err(_) => FALLBACK_JOB_NAME.to_string(),
        };
    }
    Path::new(reference.trim_end_matches(['/', '\\']))
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| reference.to_string())
}

/// Whether a reference should be fetched over HTTP rather than read from disk.
pub fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}
