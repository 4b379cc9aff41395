//! Source documents as seen by the preview host.
//!
//! Documents are owned by the editor. The host only reads their identity,
//! text and language tag.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Language tag of Graphviz sources.
pub const LANGUAGE_ID: &str = "dot";

/// Tag for documents sent without one, and for files that are not Graphviz.
pub const PLAIN_TEXT: &str = "plaintext";

/// File extensions recognized as Graphviz sources.
const FILE_EXTENSIONS: &[&str] = &[".dot", ".gv"];

/// Stable document identity (a URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Identity for a file on disk (`file://` URI when the path is absolute).
    pub fn from_path(path: &Path) -> Self {
        match url::Url::from_file_path(path) {
            Ok(url) => Self(url.to_string()),
            Err(()) => Self(path.display().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local file path, if this identity is a `file://` URI.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        url::Url::parse(&self.0).ok()?.to_file_path().ok()
    }

    /// Last path segment, percent-decoded, for display.
    pub fn file_name(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.0)
    }

    /// Human-readable name (decoded last segment).
    pub fn display_name(&self) -> String {
        percent_encoding::percent_decode_str(self.file_name())
            .decode_utf8_lossy()
            .into_owned()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(alias = "uri")]
    pub id: DocumentId,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_language", alias = "languageId")]
    pub language: String,
}

fn default_language() -> String {
    PLAIN_TEXT.to_string()
}

impl Document {
    pub fn new(id: DocumentId, text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            language: language.into(),
        }
    }

    /// Read a document from disk, tagging it by extension.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let language = if has_dot_extension(&path.to_string_lossy()) {
            LANGUAGE_ID
        } else {
            PLAIN_TEXT
        };
        Ok(Self::new(DocumentId::from_path(path), text, language))
    }

    /// Whether this document should drive a preview.
    pub fn is_previewable(&self) -> bool {
        is_dot_source(&self.language, self.id.as_str())
    }
}

/// A document is a Graphviz source if tagged `dot` or named `*.dot` / `*.gv`.
pub fn is_dot_source(language: &str, file_name: &str) -> bool {
    language == LANGUAGE_ID || has_dot_extension(file_name)
}

fn has_dot_extension(file_name: &str) -> bool {
    let name = file_name.trim().to_ascii_lowercase();
    FILE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
