// src/services/fetcher.rs

//! Document fetching service.
//!
//! Issues conditional GETs and HEAD probes for monitored documents, spacing
//! requests per host and honoring robots.txt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{DocumentDescriptor, MonitorConfig, Validators};
use crate::services::robots::RobotsRules;
use crate::utils::http::{create_async_client, header_str, is_pdf};
use crate::utils::rate_limit::HostRateLimiter;

/// Upper bound on a robots.txt Crawl-delay we are willing to honor.
const MAX_CRAWL_DELAY_SECS: f32 = 3600.0;

/// A downloaded document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub validators: Validators,
    pub fetched_at: DateTime<Utc>,
}

/// Result of a (possibly conditional) GET.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 304: the server confirmed the stored validators are current
    NotModified,
    Fetched(FetchedDocument),
}

/// Result of a HEAD probe.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub validators: Validators,
    pub content_length: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

/// Source of document bytes and metadata.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// GET the document, conditionally when `validators` is given.
    async fn fetch(
        &self,
        doc: &DocumentDescriptor,
        validators: Option<&Validators>,
    ) -> Result<FetchOutcome>;

    /// HEAD the document for validators and length.
    async fn probe(&self, doc: &DocumentDescriptor) -> Result<ProbeResult>;
}

/// HTTP implementation of [`DocumentSource`].
pub struct HttpFetcher {
    client: Client,
    config: MonitorConfig,
    limiter: HostRateLimiter,
    robots: Mutex<HashMap<String, Arc<RobotsRules>>>,
}

impl HttpFetcher {
    /// Create a fetcher with its own configured client.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let client = create_async_client(config)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &MonitorConfig) -> Self {
        Self {
            client,
            limiter: HostRateLimiter::new(config.min_request_interval()),
            config: config.clone(),
            robots: Mutex::new(HashMap::new()),
        }
    }

    /// Parse the URL and make sure robots.txt lets us request it.
    async fn prepare(&self, context: &str, raw_url: &str) -> Result<(Url, String)> {
        let url = Url::parse(raw_url)?;
        let host = url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| AppError::fetch(context, format!("URL has no host: {raw_url}")))?;

        if self.config.respect_robots_txt {
            let rules = self.robots_for(&url, &host).await;
            let mut target = url.path().to_string();
            if let Some(query) = url.query() {
                target.push('?');
                target.push_str(query);
            }
            if !rules.is_allowed(&target) {
                return Err(AppError::RobotsDisallowed(raw_url.to_string()));
            }
        }
        Ok((url, host))
    }

    /// GET an HTML page (used for index pages), under the same politeness rules.
    pub async fn fetch_text(&self, raw_url: &str) -> Result<String> {
        let (url, host) = self.prepare(raw_url, raw_url).await?;
        self.limiter.acquire(&host).await;
        log::debug!("GET {}", raw_url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                url: raw_url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// robots.txt rules for the URL's origin, fetched once per run.
    async fn robots_for(&self, url: &Url, host: &str) -> Arc<RobotsRules> {
        let origin = url.origin().ascii_serialization();
        if let Some(rules) = self.robots.lock().await.get(&origin) {
            return Arc::clone(rules);
        }

        let rules = match url.join("/robots.txt") {
            Ok(robots_url) => {
                self.limiter.acquire(host).await;
                self.download_robots(&robots_url).await
            }
            Err(_) => RobotsRules::allow_all(),
        };
        if let Some(delay) = rules.crawl_delay().filter(|d| d.is_finite() && *d > 0.0) {
            log::debug!("{} asks for a crawl delay of {}s", origin, delay);
            let delay = Duration::from_secs_f32(delay.min(MAX_CRAWL_DELAY_SECS));
            self.limiter.slow_down(host, delay).await;
        }
        let rules = Arc::new(rules);
        self.robots.lock().await.insert(origin, Arc::clone(&rules));
        rules
    }

    async fn download_robots(&self, robots_url: &Url) -> RobotsRules {
        log::debug!("Fetching {}", robots_url);
        match self.client.get(robots_url.clone()).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => RobotsRules::parse(&text, &self.config.robots_agent),
                Err(e) => {
                    log::warn!("Could not read {}: {}. Assuming allowed.", robots_url, e);
                    RobotsRules::allow_all()
                }
            },
            Ok(resp) => {
                log::debug!("{} returned {}, assuming allowed", robots_url, resp.status());
                RobotsRules::allow_all()
            }
            Err(e) => {
                log::warn!("Could not fetch {}: {}. Assuming allowed.", robots_url, e);
                RobotsRules::allow_all()
            }
        }
    }
}

#[async_trait]
impl DocumentSource for HttpFetcher {
    async fn fetch(
        &self,
        doc: &DocumentDescriptor,
        validators: Option<&Validators>,
    ) -> Result<FetchOutcome> {
        let (url, host) = self.prepare(&doc.id, &doc.url).await?;

        let mut request = self.client.get(url);
        let mut conditional = false;
        if let Some(v) = validators {
            if let Some(etag) = &v.etag {
                request = request.header(IF_NONE_MATCH, etag);
                conditional = true;
            }
            if let Some(last_modified) = &v.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
                conditional = true;
            }
        }

        self.limiter.acquire(&host).await;
        log::debug!("GET {} (conditional: {})", doc.url, conditional);
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED && conditional {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(AppError::Status {
                url: doc.url.clone(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().await?.to_vec();
        let content_type = header_str(&headers, CONTENT_TYPE);

        if self.config.require_pdf && !is_pdf(content_type.as_deref(), &bytes) {
            return Err(AppError::fetch(
                &doc.id,
                format!(
                    "expected a PDF, got {}",
                    content_type.as_deref().unwrap_or("unknown content type")
                ),
            ));
        }

        Ok(FetchOutcome::Fetched(FetchedDocument {
            bytes,
            validators: Validators::from_headers(&headers),
            fetched_at: Utc::now(),
        }))
    }

    async fn probe(&self, doc: &DocumentDescriptor) -> Result<ProbeResult> {
        let (url, host) = self.prepare(&doc.id, &doc.url).await?;

        self.limiter.acquire(&host).await;
        log::debug!("HEAD {}", doc.url);
        let response = self.client.head(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                url: doc.url.clone(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        Ok(ProbeResult {
            validators: Validators::from_headers(headers),
            content_length: header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()),
            observed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config() -> MonitorConfig {
        MonitorConfig {
            min_request_interval_secs: 0,
            ..MonitorConfig::default()
        }
    }

    fn offline_robots_config() -> MonitorConfig {
        MonitorConfig {
            respect_robots_txt: false,
            ..config()
        }
    }

    /// Raw HTTP/1.1 response. `Content-Length` is added from the body unless
    /// given in `headers`.
    fn http_response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {status} Test\r\nConnection: close\r\n");
        for (name, value) in headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        let has_length = headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("content-length"));
        if !has_length && status != 304 {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");
        let mut out = head.into_bytes();
        out.extend_from_slice(body);
        out
    }

    /// Serve canned responses keyed by request line prefix (e.g. `"GET /a.pdf "`).
    /// Returns the base URL and the lowercased request heads seen so far.
    async fn serve(routes: Vec<(&'static str, Vec<u8>)>) -> (String, Arc<StdMutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let request = String::from_utf8_lossy(&buf).to_lowercase();
                let response = routes
                    .iter()
                    .find(|(prefix, _)| request.starts_with(&prefix.to_lowercase()))
                    .map(|(_, r)| r.clone())
                    .unwrap_or_else(|| http_response(404, &[], b""));
                log.lock().unwrap().push(request);
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            }
        });

        (base, seen)
    }

    /// Fetcher that talks to the local server directly, whatever the proxy env.
    fn local_fetcher(config: &MonitorConfig) -> HttpFetcher {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .no_proxy()
            .build()
            .unwrap();
        HttpFetcher::with_client(client, config)
    }

    fn pdf_response() -> Vec<u8> {
        http_response(
            200,
            &[
                ("Content-Type", "application/pdf"),
                ("ETag", "\"v1\""),
                ("Last-Modified", "Tue, 01 Apr 2025 10:00:00 GMT"),
            ],
            b"%PDF-1.4 test",
        )
    }

    #[tokio::test]
    async fn test_prepare_rejects_hostless_url() {
        let fetcher = HttpFetcher::new(&config()).unwrap();
        let doc = DocumentDescriptor::new("a", "file:///tmp/a.pdf", "");
        assert!(fetcher.prepare(&doc.id, &doc.url).await.is_err());
    }

    #[tokio::test]
    async fn test_cached_robots_rules_block_fetch() {
        let fetcher = HttpFetcher::new(&config()).unwrap();
        fetcher.robots.lock().await.insert(
            "https://example.com".to_string(),
            Arc::new(RobotsRules::parse("User-agent: *\nDisallow: /private/\n", "docwatch")),
        );

        let blocked = DocumentDescriptor::new("a", "https://example.com/private/a.pdf", "");
        let err = fetcher.fetch(&blocked, None).await.unwrap_err();
        assert!(matches!(err, AppError::RobotsDisallowed(_)));
        assert!(!err.is_retryable());

        let probe = fetcher.probe(&blocked).await.unwrap_err();
        assert!(matches!(probe, AppError::RobotsDisallowed(_)));

        let page = fetcher
            .fetch_text("https://example.com/private/index.html")
            .await
            .unwrap_err();
        assert!(matches!(page, AppError::RobotsDisallowed(_)));
    }

    #[tokio::test]
    async fn test_robots_ignored_when_disabled() {
        let mut cfg = config();
        cfg.respect_robots_txt = false;
        let fetcher = HttpFetcher::new(&cfg).unwrap();
        fetcher.robots.lock().await.insert(
            "https://example.com".to_string(),
            Arc::new(RobotsRules::parse("User-agent: *\nDisallow: /\n", "docwatch")),
        );

        let doc = DocumentDescriptor::new("a", "https://example.com/a.pdf", "");
        let (url, host) = fetcher.prepare(&doc.id, &doc.url).await.unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(url.path(), "/a.pdf");
    }

    #[tokio::test]
    async fn test_fetch_sends_validators_only_when_stored() {
        let (base, seen) = serve(vec![("GET /a.pdf ", pdf_response())]).await;
        let fetcher = local_fetcher(&offline_robots_config());
        let doc = DocumentDescriptor::new("a", format!("{base}/a.pdf"), "");

        let first = fetcher.fetch(&doc, None).await.unwrap();
        let FetchOutcome::Fetched(fetched) = first else {
            panic!("expected a download");
        };
        assert_eq!(fetched.bytes, b"%PDF-1.4 test");
        assert_eq!(fetched.validators.etag.as_deref(), Some("\"v1\""));
        assert_eq!(
            fetched.validators.last_modified.as_deref(),
            Some("Tue, 01 Apr 2025 10:00:00 GMT")
        );

        fetcher.fetch(&doc, Some(&fetched.validators)).await.unwrap();

        let etag_only = Validators {
            etag: Some("\"v1\"".into()),
            last_modified: None,
        };
        fetcher.fetch(&doc, Some(&etag_only)).await.unwrap();

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert!(!requests[0].contains("if-none-match"));
        assert!(!requests[0].contains("if-modified-since"));
        assert!(requests[1].contains("if-none-match: \"v1\""));
        assert!(requests[1].contains("if-modified-since: tue, 01 apr 2025 10:00:00 gmt"));
        assert!(requests[2].contains("if-none-match: \"v1\""));
        assert!(!requests[2].contains("if-modified-since"));
    }

    #[tokio::test]
    async fn test_not_modified_only_counts_for_conditional_requests() {
        let (base, _) = serve(vec![("GET /a.pdf ", http_response(304, &[], b""))]).await;
        let fetcher = local_fetcher(&offline_robots_config());
        let doc = DocumentDescriptor::new("a", format!("{base}/a.pdf"), "");

        let stored = Validators {
            etag: Some("\"v1\"".into()),
            last_modified: None,
        };
        let outcome = fetcher.fetch(&doc, Some(&stored)).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NotModified));

        let err = fetcher.fetch(&doc, None).await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 304, .. }));

        // Empty validators send no conditional headers either.
        let err = fetcher.fetch(&doc, Some(&Validators::default())).await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 304, .. }));
    }

    #[tokio::test]
    async fn test_require_pdf_rejects_html() {
        let html = http_response(
            200,
            &[("Content-Type", "text/html; charset=utf-8")],
            b"<!doctype html><p>Moved</p>",
        );
        let (base, _) = serve(vec![("GET /a.pdf ", html)]).await;
        let doc = DocumentDescriptor::new("a", format!("{base}/a.pdf"), "");

        let fetcher = local_fetcher(&offline_robots_config());
        let err = fetcher.fetch(&doc, None).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch { .. }));
        assert!(!err.is_retryable());

        let lenient = local_fetcher(&MonitorConfig {
            require_pdf: false,
            ..offline_robots_config()
        });
        assert!(matches!(
            lenient.fetch(&doc, None).await.unwrap(),
            FetchOutcome::Fetched(_)
        ));
    }

    #[tokio::test]
    async fn test_head_reads_length_and_validators() {
        let head = http_response(
            200,
            &[
                ("Content-Type", "application/pdf"),
                ("Content-Length", "1234"),
                ("ETag", "\"v2\""),
            ],
            b"",
        );
        let (base, seen) = serve(vec![("HEAD /a.pdf ", head)]).await;
        let fetcher = local_fetcher(&offline_robots_config());
        let doc = DocumentDescriptor::new("a", format!("{base}/a.pdf"), "");

        let result = fetcher.probe(&doc).await.unwrap();
        assert_eq!(result.content_length, Some(1234));
        assert_eq!(result.validators.etag.as_deref(), Some("\"v2\""));
        assert_eq!(result.validators.last_modified, None);
        assert!(seen.lock().unwrap()[0].starts_with("head /a.pdf "));
    }

    #[tokio::test]
    async fn test_head_error_status() {
        let (base, _) = serve(vec![("HEAD /a.pdf ", http_response(405, &[], b""))]).await;
        let fetcher = local_fetcher(&offline_robots_config());
        let doc = DocumentDescriptor::new("a", format!("{base}/a.pdf"), "");

        let err = fetcher.probe(&doc).await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 405, .. }));
    }

    #[tokio::test]
    async fn test_robots_txt_downloaded_once_per_origin() {
        let robots = http_response(
            200,
            &[("Content-Type", "text/plain")],
            b"User-agent: Mozilla\nDisallow: /\n\nUser-agent: *\nDisallow: /private/\n",
        );
        let (base, seen) = serve(vec![
            ("GET /robots.txt ", robots),
            ("GET /a.pdf ", pdf_response()),
        ])
        .await;
        let fetcher = local_fetcher(&config());

        let allowed = DocumentDescriptor::new("a", format!("{base}/a.pdf"), "");
        assert!(matches!(
            fetcher.fetch(&allowed, None).await.unwrap(),
            FetchOutcome::Fetched(_)
        ));

        let blocked = DocumentDescriptor::new("b", format!("{base}/private/b.pdf"), "");
        let err = fetcher.fetch(&blocked, None).await.unwrap_err();
        assert!(matches!(err, AppError::RobotsDisallowed(_)));

        let requests = seen.lock().unwrap().clone();
        let robots_requests = requests
            .iter()
            .filter(|r| r.starts_with("get /robots.txt "))
            .count();
        assert_eq!(robots_requests, 1);
        assert!(!requests.iter().any(|r| r.starts_with("get /private/")));
    }

    #[tokio::test]
    async fn test_missing_robots_txt_allows_everything() {
        let (base, _) = serve(vec![("GET /a.pdf ", pdf_response())]).await;
        let fetcher = local_fetcher(&config());
        let doc = DocumentDescriptor::new("a", format!("{base}/a.pdf"), "");

        assert!(matches!(
            fetcher.fetch(&doc, None).await.unwrap(),
            FetchOutcome::Fetched(_)
        ));
    }
}
