//! Attached document model and file hygiene
//!
//! Covers the pre-upload normalization steps: filename sanitization,
//! MIME-type normalization for files the storage backend would otherwise
//! reject, and the document handle that travels with an outgoing message.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Extensions whose guessed MIME types are wrong or missing for plain source
/// files (`.ts` is routinely labelled `video/mp2t`). These are coerced to a
/// generic binary type the storage backend accepts.
pub const BINARY_COERCED_EXTENSIONS: &[&str] = &["ts", "tsx", "ps1", "psm1"];

pub const GENERIC_BINARY_MIME: &str = "application/octet-stream";

/// Server-side extraction results for an uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Number of text items extracted from the document
    pub total_items: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u64>,
    #[serde(default)]
    pub is_image: bool,
}

/// A document attached to an outgoing message.
///
/// Created on file selection with `progress = 0` and empty content; the
/// upload pipeline fills in `key` and `metadata` as the server confirms them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedDocument {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Raw inline content, kept only when uploads are disabled so the text
    /// can be inlined into the prompt locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    /// Remote storage key, set once the upload has been accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    /// Upload progress, 0 to 100.
    pub progress: u8,
}

impl AttachedDocument {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            mime_type: mime_type.into(),
            raw_content: None,
            key: None,
            metadata: None,
            progress: 0,
        }
    }

    /// True once the document is usable in an outgoing message.
    pub fn is_ready(&self) -> bool {
        self.progress >= 100
    }
}

/// Collapse whitespace and underscore runs into a single underscore.
/// `"My File (v2).docx"` becomes `"My_File_(v2).docx"`.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '_' {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

/// Normalize a browser-reported MIME type so the storage backend accepts it.
/// Source files with misdetected or empty types become a generic binary type.
pub fn normalize_mime_type(file_name: &str, reported: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if reported.trim().is_empty() || BINARY_COERCED_EXTENSIONS.contains(&extension.as_str()) {
        GENERIC_BINARY_MIME.to_string()
    } else {
        reported.to_string()
    }
}
