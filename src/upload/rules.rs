use super::Category;
use crate::errors::UploadError;
use std::collections::HashMap;
use std::path::Path;

pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRule {
    pub max_bytes: u64,
    /// Lowercase, with the leading dot.
    pub extensions: &'static [&'static str],
}

impl ValidationRule {
    pub const fn new(max_bytes: u64, extensions: &'static [&'static str]) -> Self {
        Self {
            max_bytes,
            extensions,
        }
    }

    /// Checks size first, then extension. On success returns the allow-list entry
    /// matching the declared filename, which becomes the stored file's extension.
    pub fn check(
        &self,
        category: Category,
        filename: &str,
        size: u64,
    ) -> Result<&'static str, UploadError> {
        if size > self.max_bytes {
            return Err(UploadError::FileTooLarge {
                category,
                size,
                max: self.max_bytes,
            });
        }

        let extension = extension_of(filename);
        let matched = extension
            .as_deref()
            .and_then(|ext| self.extensions.iter().copied().find(|allowed| *allowed == ext));
        matched.ok_or(UploadError::UnsupportedExtension {
            category,
            extension,
            allowed: self.extensions,
        })
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Category to rule lookup table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: HashMap<Category, ValidationRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn with(mut self, category: Category, rule: ValidationRule) -> Self {
        self.rules.insert(category, rule);
        self
    }

    pub fn get(&self, category: Category) -> Option<&ValidationRule> {
        self.rules.get(&category)
    }

    /// Validates against the category's rule. A category without a rule accepts nothing.
    pub fn check(
        &self,
        category: Category,
        filename: &str,
        size: u64,
    ) -> Result<&'static str, UploadError> {
        match self.get(category) {
            Some(rule) => rule.check(category, filename, size),
            None => Err(UploadError::UnsupportedExtension {
                category,
                extension: extension_of(filename),
                allowed: &[],
            }),
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
            .with(
                Category::Photo,
                ValidationRule::new(MAX_UPLOAD_BYTES, &[".jpg", ".jpeg", ".png", ".webp"]),
            )
            .with(
                Category::Cv,
                ValidationRule::new(MAX_UPLOAD_BYTES, &[".pdf", ".doc", ".docx"]),
            )
            .with(
                Category::Id,
                ValidationRule::new(MAX_UPLOAD_BYTES, &[".pdf", ".jpg", ".jpeg", ".png"]),
            )
    }
}
