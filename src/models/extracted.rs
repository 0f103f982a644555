// src/models/extracted.rs

//! Structured text extracted from a document version.

use std::collections::BTreeSet;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A labelled section found in the text (AREA OF OPERATION, TASK, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Byte offset of the match in the text
    pub position: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AreaOfOperation {
    pub number: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub code: String,
    pub title: String,
}

/// Standards and cross-references pulled out of the text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Standards {
    #[serde(default)]
    pub areas_of_operation: Vec<AreaOfOperation>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Document-level properties read from the PDF structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// `/Title` from the document information dictionary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.page_count.is_none()
    }
}

/// Extractor output for one `(document id, content hash)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedContent {
    pub document_id: String,
    pub content_hash: String,
    /// Name of the extractor that produced this
    pub method: String,
    pub extracted_at: DateTime<Utc>,
    pub word_count: usize,
    pub character_count: usize,
    #[serde(default, skip_serializing_if = "DocumentMetadata::is_empty")]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub standards: Standards,
    #[serde(default)]
    pub sections: Vec<Section>,
    pub text: String,
}

impl ExtractedContent {
    /// Render a markdown view: header, standards, then the full text.
    pub fn to_markdown(&self, title: &str, source: &str) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# {title}\n");
        let _ = writeln!(md, "**Processed:** {}  ", self.extracted_at.to_rfc3339());
        let _ = writeln!(md, "**Method:** {}  ", self.method);
        let _ = writeln!(md, "**Source:** {source}  ");
        if let Some(doc_title) = &self.metadata.title {
            let _ = writeln!(md, "**Document Title:** {doc_title}  ");
        }
        if let Some(pages) = self.metadata.page_count {
            let _ = writeln!(md, "**Pages:** {pages}  ");
        }
        let _ = writeln!(md, "**Content Hash:** `{}`  \n", self.content_hash);

        if !self.standards.areas_of_operation.is_empty() {
            md.push_str("## Areas of Operation\n\n");
            for area in &self.standards.areas_of_operation {
                let _ = writeln!(md, "- **{}**: {}", area.number, area.title);
            }
            md.push('\n');
        }

        if !self.standards.tasks.is_empty() {
            md.push_str("## Tasks\n\n");
            for task in &self.standards.tasks {
                let _ = writeln!(md, "- **{}**: {}", task.code, task.title);
            }
            md.push('\n');
        }

        if !self.standards.references.is_empty() {
            md.push_str("## References\n\n");
            let unique: BTreeSet<&str> = self.standards.references.iter().map(String::as_str).collect();
            for reference in unique {
                let _ = writeln!(md, "- {reference}");
            }
            md.push('\n');
        }

        md.push_str("## Full Text\n\n");
        md.push_str(&self.text);
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_dedupes_references() {
        let content = ExtractedContent {
            document_id: "private".into(),
            content_hash: "abc".into(),
            method: "pdf-extract".into(),
            extracted_at: Utc::now(),
            word_count: 2,
            character_count: 11,
            metadata: DocumentMetadata {
                title: None,
                page_count: Some(84),
            },
            standards: Standards {
                areas_of_operation: vec![AreaOfOperation {
                    number: "I".into(),
                    title: "Preflight Preparation".into(),
                }],
                tasks: vec![],
                references: vec!["14 CFR part 61".into(), "14 CFR part 61".into()],
            },
            sections: vec![],
            text: "hello world".into(),
        };

        let md = content.to_markdown("Private Pilot ACS", "https://example.com/p.pdf");
        assert!(md.starts_with("# Private Pilot ACS"));
        assert!(md.contains("- **I**: Preflight Preparation"));
        assert!(md.contains("**Pages:** 84"));
        assert!(!md.contains("**Document Title:**"));
        assert_eq!(md.matches("- 14 CFR part 61").count(), 1);
        assert!(!md.contains("## Tasks"));
        assert!(md.ends_with("hello world"));
    }

    #[test]
    fn test_metadata_is_optional_in_json() {
        let json = r#"{
            "document_id": "private",
            "content_hash": "abc",
            "method": "pdf-extract",
            "extracted_at": "2025-04-01T10:00:00Z",
            "word_count": 0,
            "character_count": 0,
            "text": ""
        }"#;
        let content: ExtractedContent = serde_json::from_str(json).unwrap();
        assert!(content.metadata.is_empty());
        assert!(!serde_json::to_string(&content).unwrap().contains("metadata"));
    }
}
