mod local_fs;
mod rules;

pub use local_fs::LocalUploadStore;
pub use rules::{MAX_UPLOAD_BYTES, RuleSet, ValidationRule};

use crate::errors::{ApiError, UploadError};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Kind of employee document. Selects the validation rule applied on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Photo,
    Cv,
    Id,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Photo, Category::Cv, Category::Id];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Photo => "photo",
            Category::Cv => "cv",
            Category::Id => "id",
        }
    }

    /// Multipart field the employee forms submit this document under.
    pub fn field_name(self) -> &'static str {
        match self {
            Category::Photo => "photo",
            Category::Cv => "cv",
            Category::Id => "id_document",
        }
    }

    /// Employee record column holding the stored reference.
    pub fn column(self) -> &'static str {
        match self {
            Category::Photo => "photo_path",
            Category::Cv => "cv_path",
            Category::Id => "id_path",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Photo => "Photo",
            Category::Cv => "CV",
            Category::Id => "ID document",
        }
    }

    pub fn from_field(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.field_name() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded file as handed over by the form layer.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub category: Category,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    pub fn new(category: Category, filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            category,
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Public path of a stored file, e.g. `/uploads/<uuid>.pdf`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StoredFileReference(String);

impl StoredFileReference {
    pub(crate) fn new(prefix: &str, file_name: &str) -> Self {
        Self(format!("{prefix}/{file_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generated file name, without the public prefix.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for StoredFileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form of a public URL prefix: leading `/`, no trailing `/`.
/// `"uploads/"` becomes `"/uploads"`, `"/"` becomes `""`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn store(&self, request: UploadRequest) -> Result<StoredFileReference, UploadError>;
    async fn open(&self, file_name: &str) -> Result<Vec<u8>, ApiError>;
    /// Prefix every returned reference starts with; files are served under it.
    fn public_prefix(&self) -> &str;
}
