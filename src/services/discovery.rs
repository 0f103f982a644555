// src/services/discovery.rs

//! Builds a document list from an index page's PDF links.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{DiscoveryConfig, DocumentDescriptor, DocumentList, derive_id};
use crate::services::fetcher::HttpFetcher;
use crate::utils::resolve_url;

/// Scans an index page for monitored PDF documents.
pub struct DocumentDiscovery<'a> {
    fetcher: &'a HttpFetcher,
    config: &'a DiscoveryConfig,
}

impl<'a> DocumentDiscovery<'a> {
    pub fn new(fetcher: &'a HttpFetcher, config: &'a DiscoveryConfig) -> Self {
        Self { fetcher, config }
    }

    /// Fetch `index_url` and collect the PDF links matching the keywords.
    pub async fn discover(&self, index_url: &str) -> Result<DocumentList> {
        log::info!("Scanning {} for documents", index_url);
        let html = self.fetcher.fetch_text(index_url).await?;
        let base = Url::parse(index_url)?;

        let list = extract_documents(&html, &base, self.config)?;
        log::info!("Found {} matching PDF links", list.documents.len());
        Ok(list)
    }
}

/// Parse `html` and turn matching PDF anchors into descriptors.
///
/// Duplicate URLs are dropped; colliding ids get a numeric suffix.
pub fn extract_documents(html: &str, base: &Url, config: &DiscoveryConfig) -> Result<DocumentList> {
    let link_selector =
        Selector::parse("a[href]").map_err(|e| AppError::selector("a[href]", e.to_string()))?;
    let document = Html::parse_document(html);

    let keywords: Vec<String> = config.keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut seen_urls = HashSet::new();
    let mut seen_ids = HashSet::new();
    let mut documents = Vec::new();

    for element in document.select(&link_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let url = resolve_url(base, href.trim());
        if !is_pdf_link(&url) || !seen_urls.insert(url.clone()) {
            continue;
        }

        let text = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let haystack = format!("{} {}", text.to_lowercase(), url.to_lowercase());
        if !keywords.is_empty() && !keywords.iter().any(|k| haystack.contains(k.as_str())) {
            continue;
        }

        let base_id = derive_id(&url);
        let mut id = base_id.clone();
        let mut n = 2;
        while !seen_ids.insert(id.clone()) {
            id = format!("{base_id}-{n}");
            n += 1;
        }

        let mut doc = DocumentDescriptor::new(id, url, config.category.clone());
        if !text.is_empty() {
            doc.name = Some(text);
        }
        documents.push(doc);
    }

    Ok(DocumentList { documents })
}

fn is_pdf_link(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
<html><body>
  <ul>
    <li><a href="/training_testing/testing/acs/private_airplane_acs_6.pdf">Private Pilot - Airplane ACS</a></li>
    <li><a href="media/commercial_airplane_acs_7.pdf">
        Commercial Pilot
        Airman Certification Standards</a></li>
    <li><a href="/training_testing/testing/acs/private_airplane_acs_6.pdf">Duplicate</a></li>
    <li><a href="/forms/medical_form.pdf">Medical Form</a></li>
    <li><a href="/training_testing/testing/acs/">ACS index</a></li>
    <li><a href="https://other.example/standards/private_airplane_acs_6.PDF">Mirror</a></li>
  </ul>
</body></html>
"#;

    fn base() -> Url {
        Url::parse("https://www.faa.gov/training_testing/testing/acs/").unwrap()
    }

    #[test]
    fn test_extracts_matching_pdf_links() {
        let list = extract_documents(INDEX, &base(), &DiscoveryConfig::default()).unwrap();
        let ids: Vec<&str> = list.documents.iter().map(|d| d.id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                "private-airplane-acs-6",
                "commercial-airplane-acs-7",
                "private-airplane-acs-6-2"
            ]
        );
        assert_eq!(
            list.documents[1].url,
            "https://www.faa.gov/training_testing/testing/acs/media/commercial_airplane_acs_7.pdf"
        );
        assert_eq!(
            list.documents[1].name.as_deref(),
            Some("Commercial Pilot Airman Certification Standards")
        );
        assert!(list.documents.iter().all(|d| d.category == "acs"));
        assert!(list.validate().is_ok());
    }

    #[test]
    fn test_empty_keywords_keep_every_pdf() {
        let config = DiscoveryConfig {
            keywords: Vec::new(),
            ..DiscoveryConfig::default()
        };
        let list = extract_documents(INDEX, &base(), &config).unwrap();
        assert_eq!(list.documents.len(), 4);
        assert!(list.documents.iter().any(|d| d.id == "medical-form"));
    }

    #[test]
    fn test_is_pdf_link() {
        assert!(is_pdf_link("https://example.com/a.pdf"));
        assert!(is_pdf_link("https://example.com/a.PDF?x=1"));
        assert!(!is_pdf_link("https://example.com/a.pdf.html"));
        assert!(!is_pdf_link("not a url"));
    }
}
