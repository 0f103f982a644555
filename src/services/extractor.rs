// src/services/extractor.rs

//! PDF text extraction.
//!
//! Wraps the `pdf-extract` crate and pulls ACS structure (areas of
//! operation, tasks, references) out of the resulting text. Title and page
//! count come from the PDF structure through `lopdf`.

use std::panic;

use chrono::Utc;
use lopdf::{Document, Object};
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{AreaOfOperation, DocumentMetadata, ExtractedContent, Section, Standards, Task};

/// Turns raw document bytes into structured content.
pub trait Extractor: Send + Sync {
    /// Identifier recorded in the output.
    fn name(&self) -> &str;

    fn extract(&self, document_id: &str, content_hash: &str, bytes: &[u8]) -> Result<ExtractedContent>;
}

/// Extractor backed by `pdf-extract`.
pub struct PdfExtractor {
    parser: AcsParser,
}

impl PdfExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: AcsParser::new()?,
        })
    }
}

impl Extractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract(&self, document_id: &str, content_hash: &str, bytes: &[u8]) -> Result<ExtractedContent> {
        let text = extract_text(bytes).map_err(|msg| AppError::extraction(document_id, msg))?;
        if text.trim().is_empty() {
            log::warn!("No text extracted from {} (scanned or image-only PDF?)", document_id);
        }
        let mut content = self.parser.build(document_id, content_hash, self.name(), text);
        content.metadata = read_metadata(bytes);
        Ok(content)
    }
}

/// Title and page count, or nothing when the structure cannot be read.
fn read_metadata(bytes: &[u8]) -> DocumentMetadata {
    let doc = match panic::catch_unwind(|| Document::load_mem(bytes)) {
        Ok(Ok(doc)) => doc,
        Ok(Err(e)) => {
            log::debug!("PDF structure unreadable: {}", e);
            return DocumentMetadata::default();
        }
        Err(_) => {
            log::debug!("PDF structure reader panicked");
            return DocumentMetadata::default();
        }
    };

    let pages = doc.get_pages().len();
    DocumentMetadata {
        title: info_title(&doc),
        page_count: (pages > 0).then_some(pages),
    }
}

fn info_title(doc: &Document) -> Option<String> {
    let info = match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match info.as_dict().ok()?.get(b"Title").ok()? {
        Object::String(raw, _) => decode_pdf_string(raw),
        _ => None,
    }
}

/// PDF text strings are UTF-16BE with a BOM, or a single-byte encoding.
fn decode_pdf_string(raw: &[u8]) -> Option<String> {
    let text = match raw.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => match std::str::from_utf8(raw) {
            Ok(s) => s.to_string(),
            Err(_) => raw.iter().map(|&b| b as char).collect(),
        },
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Run `pdf-extract`, containing panics raised on malformed input.
fn extract_text(bytes: &[u8]) -> std::result::Result<String, String> {
    match panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("PDF parser panicked: {msg}"))
        }
    }
}

/// Regex-based recognizer for Airman Certification Standards structure.
pub struct AcsParser {
    section_patterns: Vec<Regex>,
    area_pattern: Regex,
    task_pattern: Regex,
    reference_patterns: Vec<Regex>,
}

impl AcsParser {
    pub fn new() -> Result<Self> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| AppError::config(format!("invalid pattern {p}: {e}")))
        };

        let section_patterns = [
            r"(?im)(AREA OF OPERATION\s+[IVXLC]+)\s*[:\-]\s*([^\n]+)",
            r"(?im)(TASK\s+[A-Z]+)\.\s*([^\n]+)",
            r"(?im)(REFERENCES?:?\s*)([^\n]+)",
            r"(?im)(OBJECTIVE:?\s*)([^\n]+)",
            r"(?im)(KNOWLEDGE:?\s*)([^\n]+)",
            r"(?im)(RISK MANAGEMENT:?\s*)([^\n]+)",
            r"(?im)(SKILLS:?\s*)([^\n]+)",
        ]
        .into_iter()
        .map(compile)
        .collect::<Result<Vec<_>>>()?;

        let reference_patterns = [
            r"(?i)14 CFR part (\d+)",
            r"(?i)AC (\d+-\d+[A-Z]*)",
            r"(?i)AIM (\d+-\d+-\d+)",
            r"(?i)POH/AFM",
        ]
        .into_iter()
        .map(compile)
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            section_patterns,
            area_pattern: compile(r"(?i)AREA OF OPERATION\s+([IVXLC]+)\s*[:\-]\s*([^\n]+)")?,
            task_pattern: compile(r"(?i)TASK\s+([A-Z]+)\.\s*([^\n]+)")?,
            reference_patterns,
        })
    }

    /// Labelled sections in document order.
    pub fn sections(&self, text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        for pattern in &self.section_patterns {
            for caps in pattern.captures_iter(text) {
                let (Some(whole), Some(kind), Some(content)) = (caps.get(0), caps.get(1), caps.get(2))
                else {
                    continue;
                };
                sections.push(Section {
                    kind: kind.as_str().trim().to_string(),
                    content: content.as_str().trim().to_string(),
                    position: whole.start(),
                    length: whole.len(),
                });
            }
        }
        sections.sort_by_key(|s| s.position);
        sections
    }

    /// Areas of operation, tasks and regulatory references.
    pub fn standards(&self, text: &str) -> Standards {
        let areas_of_operation = self
            .area_pattern
            .captures_iter(text)
            .filter_map(|c| {
                Some(AreaOfOperation {
                    number: c.get(1)?.as_str().to_string(),
                    title: c.get(2)?.as_str().trim().to_string(),
                })
            })
            .collect();

        let tasks = self
            .task_pattern
            .captures_iter(text)
            .filter_map(|c| {
                Some(Task {
                    code: c.get(1)?.as_str().to_string(),
                    title: c.get(2)?.as_str().trim().to_string(),
                })
            })
            .collect();

        let references = self
            .reference_patterns
            .iter()
            .flat_map(|p| p.find_iter(text).map(|m| m.as_str().to_string()))
            .collect();

        Standards {
            areas_of_operation,
            tasks,
            references,
        }
    }

    /// Assemble the full extraction record for a text.
    pub fn build(&self, document_id: &str, content_hash: &str, method: &str, text: String) -> ExtractedContent {
        ExtractedContent {
            document_id: document_id.to_string(),
            content_hash: content_hash.to_string(),
            method: method.to_string(),
            extracted_at: Utc::now(),
            word_count: text.split_whitespace().count(),
            character_count: text.chars().count(),
            metadata: DocumentMetadata::default(),
            standards: self.standards(&text),
            sections: self.sections(&text),
            text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Private Pilot - Airplane Airman Certification Standards
AREA OF OPERATION I: Preflight Preparation
TASK A. Pilot Qualifications
References: 14 CFR part 61, 91; AC 61-65J; POH/AFM
Objective: To determine the applicant exhibits satisfactory knowledge.
AREA OF OPERATION II - Preflight Procedures
TASK B. Flight Deck Management
See AIM 7-1-1 for details.
";

    #[test]
    fn test_standards() {
        let parser = AcsParser::new().unwrap();
        let standards = parser.standards(SAMPLE);

        assert_eq!(
            standards.areas_of_operation,
            vec![
                AreaOfOperation {
                    number: "I".into(),
                    title: "Preflight Preparation".into()
                },
                AreaOfOperation {
                    number: "II".into(),
                    title: "Preflight Procedures".into()
                },
            ]
        );
        assert_eq!(standards.tasks.len(), 2);
        assert_eq!(standards.tasks[1].code, "B");
        assert_eq!(standards.tasks[1].title, "Flight Deck Management");
        assert!(standards.references.contains(&"14 CFR part 61".to_string()));
        assert!(standards.references.contains(&"AC 61-65J".to_string()));
        assert!(standards.references.contains(&"AIM 7-1-1".to_string()));
        assert!(standards.references.contains(&"POH/AFM".to_string()));
    }

    #[test]
    fn test_sections_sorted_by_position() {
        let parser = AcsParser::new().unwrap();
        let sections = parser.sections(SAMPLE);

        assert!(!sections.is_empty());
        assert!(sections.windows(2).all(|w| w[0].position <= w[1].position));
        assert_eq!(sections[0].kind, "AREA OF OPERATION I");
        assert_eq!(sections[0].content, "Preflight Preparation");
        assert!(sections.iter().any(|s| s.kind.starts_with("Objective")));
    }

    #[test]
    fn test_build_counts() {
        let parser = AcsParser::new().unwrap();
        let content = parser.build("doc", "hash", "test", "one two  three".to_string());
        assert_eq!(content.word_count, 3);
        assert_eq!(content.character_count, 14);
        assert_eq!(content.document_id, "doc");
    }

    #[test]
    fn test_garbage_bytes_are_extraction_errors() {
        let extractor = PdfExtractor::new().unwrap();
        let err = extractor
            .extract("doc", "hash", b"<html>not a pdf</html>")
            .unwrap_err();
        assert!(matches!(err, AppError::Extraction { .. }));
    }

    fn pdf_with_title(title: &str, pages: usize) -> Vec<u8> {
        use lopdf::dictionary;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_read_metadata() {
        let bytes = pdf_with_title("Private Pilot - Airplane ACS", 3);
        let metadata = read_metadata(&bytes);
        assert_eq!(metadata.title.as_deref(), Some("Private Pilot - Airplane ACS"));
        assert_eq!(metadata.page_count, Some(3));
    }

    #[test]
    fn test_unreadable_structure_has_no_metadata() {
        assert!(read_metadata(b"<html>not a pdf</html>").is_empty());
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string(b"  ACS  ").as_deref(), Some("ACS"));
        assert_eq!(
            decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x43, 0x00, 0x53]).as_deref(),
            Some("ACS")
        );
        assert_eq!(decode_pdf_string(&[0x41, 0xE9]).as_deref(), Some("A\u{e9}"));
        assert_eq!(decode_pdf_string(b"   "), None);
    }
}
