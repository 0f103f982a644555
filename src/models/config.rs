//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Floor for the per-host request interval.
pub const MIN_REQUEST_INTERVAL_SECS: u64 = 60;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and checking behavior settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// File locations, relative to the storage directory
    #[serde(default)]
    pub paths: PathsConfig,

    /// PDF extraction output settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Where change notifications go
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Index page scraping for `discover`
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("No config at {:?}. Using defaults.", path);
            return Ok(Self::default());
        }
        Self::load(path)
            .map_err(|e| AppError::config(format!("Cannot load {}: {e}", path.display())))
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.user_agent.trim().is_empty() {
            return Err(AppError::validation("monitor.user_agent is empty"));
        }
        if self.monitor.robots_agent.is_empty()
            || !self
                .monitor
                .robots_agent
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == '-' || c == '_')
        {
            return Err(AppError::validation(
                "monitor.robots_agent must be a product token of letters, '-' and '_'",
            ));
        }
        if self.monitor.timeout_secs == 0 {
            return Err(AppError::validation("monitor.timeout_secs must be > 0"));
        }
        if self.monitor.min_request_interval_secs < MIN_REQUEST_INTERVAL_SECS {
            return Err(AppError::validation(format!(
                "monitor.min_request_interval_secs must be >= {MIN_REQUEST_INTERVAL_SECS}"
            )));
        }
        if self.paths.data_dir.trim().is_empty() {
            return Err(AppError::validation("paths.data_dir is empty"));
        }
        if self.paths.documents_file.trim().is_empty() {
            return Err(AppError::validation("paths.documents_file is empty"));
        }
        match self.notifier.kind {
            NotifierKind::Github => {
                if self.notifier.repository.as_deref().is_none_or(|r| !r.contains('/')) {
                    return Err(AppError::validation(
                        "notifier.repository must be set as owner/name for the github notifier",
                    ));
                }
                if self.notifier.token_env.trim().is_empty() {
                    return Err(AppError::validation("notifier.token_env is empty"));
                }
            }
            NotifierKind::File => {
                if self.notifier.output_path.trim().is_empty() {
                    return Err(AppError::validation("notifier.output_path is empty"));
                }
            }
            NotifierKind::Log => {}
        }
        Ok(())
    }
}

/// How a document is checked for changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    /// Conditional GET using stored validators
    #[default]
    Conditional,
    /// HEAD probe first, full GET only when the probe is inconclusive
    Head,
}

/// HTTP client and checking behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Product token matched against robots.txt `User-agent` lines
    #[serde(default = "defaults::robots_agent")]
    pub robots_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum delay between requests to the same host
    #[serde(default = "defaults::min_request_interval")]
    pub min_request_interval_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base backoff; doubled on each retry
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_secs: u64,

    #[serde(default)]
    pub check_mode: CheckMode,

    #[serde(default = "defaults::enabled")]
    pub respect_robots_txt: bool,

    /// Reject 200 responses that are not PDFs
    #[serde(default = "defaults::enabled")]
    pub require_pdf: bool,
}

impl MonitorConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_secs(self.min_request_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            robots_agent: defaults::robots_agent(),
            timeout_secs: defaults::timeout(),
            min_request_interval_secs: defaults::min_request_interval(),
            max_retries: defaults::max_retries(),
            retry_backoff_secs: defaults::retry_backoff(),
            check_mode: CheckMode::default(),
            respect_robots_txt: true,
            require_pdf: true,
        }
    }
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of fingerprints, artifacts and logs
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,

    /// Document descriptor list
    #[serde(default = "defaults::documents_file")]
    pub documents_file: String,
}

impl PathsConfig {
    pub fn data_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.data_dir)
    }

    pub fn documents_file(&self, base: &Path) -> PathBuf {
        base.join(&self.documents_file)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            documents_file: defaults::documents_file(),
        }
    }
}

/// Extraction output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Also write a markdown rendering next to the JSON
    #[serde(default = "defaults::enabled")]
    pub write_markdown: bool,

    /// Also write the plain text next to the JSON
    #[serde(default = "defaults::enabled")]
    pub write_text: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            write_markdown: true,
            write_text: true,
        }
    }
}

/// Notification channel selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    File,
    Github,
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,

    /// `owner/name` for the github notifier
    #[serde(default)]
    pub repository: Option<String>,

    /// Environment variable holding the API token
    #[serde(default = "defaults::token_env")]
    pub token_env: String,

    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    #[serde(default = "defaults::labels")]
    pub labels: Vec<String>,

    /// Title prefix; the run date is appended
    #[serde(default = "defaults::title")]
    pub title: String,

    /// Markdown output for the file notifier, relative to the storage directory
    #[serde(default = "defaults::notification_file")]
    pub output_path: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            repository: None,
            token_env: defaults::token_env(),
            api_base: defaults::api_base(),
            labels: defaults::labels(),
            title: defaults::title(),
            output_path: defaults::notification_file(),
        }
    }
}

/// Index page discovery rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Page listing the documents
    #[serde(default)]
    pub index_url: Option<String>,

    /// Keep links whose text or URL contains one of these (case-insensitive)
    #[serde(default = "defaults::keywords")]
    pub keywords: Vec<String>,

    /// Category assigned to discovered documents
    #[serde(default = "defaults::category")]
    pub category: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            index_url: None,
            keywords: defaults::keywords(),
            category: defaults::category(),
        }
    }
}

mod defaults {
    // Monitor defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; docwatch/0.1)".into()
    }
    pub fn robots_agent() -> String {
        "docwatch".into()
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn min_request_interval() -> u64 {
        super::MIN_REQUEST_INTERVAL_SECS
    }
    pub fn max_retries() -> u32 {
        2
    }
    pub fn retry_backoff() -> u64 {
        30
    }
    pub fn enabled() -> bool {
        true
    }

    // Path defaults
    pub fn data_dir() -> String {
        "data".into()
    }
    pub fn documents_file() -> String {
        "documents.toml".into()
    }

    // Notifier defaults
    pub fn token_env() -> String {
        "GITHUB_TOKEN".into()
    }
    pub fn api_base() -> String {
        "https://api.github.com".into()
    }
    pub fn labels() -> Vec<String> {
        vec![
            "faa-acs".into(),
            "document-update".into(),
            "automated".into(),
        ]
    }
    pub fn title() -> String {
        "FAA ACS Documents Updated".into()
    }
    pub fn notification_file() -> String {
        "data/metadata/notification.md".into()
    }

    // Discovery defaults
    pub fn keywords() -> Vec<String> {
        vec![
            "acs".into(),
            "airman".into(),
            "certification".into(),
            "standards".into(),
        ]
    }
    pub fn category() -> String {
        "acs".into()
    }
}
