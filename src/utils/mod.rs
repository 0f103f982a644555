//! Utility functions and helpers.

pub mod http;
pub mod rate_limit;
pub mod retry;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.pdf"),
            "https://example.com/path/page.pdf"
        );
        assert_eq!(
            resolve_url(&base, "/root.pdf"),
            "https://example.com/root.pdf"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x.pdf"),
            "https://other.com/x.pdf"
        );
    }
}
