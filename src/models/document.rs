// src/models/document.rs

//! Document descriptors loaded from `documents.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// A monitored document as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentDescriptor {
    /// Stable key; derived from the URL when left empty
    #[serde(default)]
    pub id: String,

    /// Display name used in notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Source URL of the PDF
    pub url: String,

    /// Free-form category/tag
    #[serde(default)]
    pub category: String,
}

impl DocumentDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            url: url.into(),
            category: category.into(),
        }
    }

    /// Human-readable name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// The `documents.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentList {
    #[serde(default)]
    pub documents: Vec<DocumentDescriptor>,
}

impl DocumentList {
    /// Load, fill in derived ids, and validate the document list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!(
                "Cannot read document list {}: {e}",
                path.display()
            ))
        })?;
        let mut list: DocumentList = toml::from_str(&content)?;
        list.resolve_ids();
        list.validate()?;
        Ok(list)
    }

    /// Write the list as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Replace empty ids with ones derived from the URL.
    pub fn resolve_ids(&mut self) {
        for doc in &mut self.documents {
            if doc.id.trim().is_empty() {
                doc.id = derive_id(&doc.url);
            }
        }
    }

    /// Check ids are unique and filesystem-safe and URLs are http(s).
    pub fn validate(&self) -> Result<()> {
        if self.documents.is_empty() {
            return Err(AppError::validation("No documents defined"));
        }

        let mut seen = HashSet::new();
        for doc in &self.documents {
            if !is_safe_id(&doc.id) {
                return Err(AppError::validation(format!(
                    "Document id '{}' must match [a-z0-9._-]+",
                    doc.id
                )));
            }
            if !seen.insert(doc.id.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate document id '{}'",
                    doc.id
                )));
            }
            let url = Url::parse(&doc.url)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AppError::validation(format!(
                    "Unsupported URL scheme for '{}': {}",
                    doc.id, doc.url
                )));
            }
        }
        Ok(())
    }
}

/// Derive a stable id from a URL's file stem.
///
/// `https://www.faa.gov/.../private_airplane_acs_6.pdf` becomes
/// `private-airplane-acs-6`.
pub fn derive_id(url: &str) -> String {
    let stem = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_default();
    let stem = stem
        .rsplit_once('.')
        .map(|(head, _)| head.to_string())
        .unwrap_or(stem);

    let mut id = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    let id = id.trim_matches('-').to_string();
    if id.is_empty() { "document".to_string() } else { id }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}
