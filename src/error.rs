// src/error.rs

//! Unified error handling for the document monitor.

use std::fmt;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Server answered with a status other than 2xx/304
    #[error("Unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    /// robots.txt forbids fetching the URL
    #[error("Disallowed by robots.txt: {0}")]
    RobotsDisallowed(String),

    /// Fetch failed for a reason other than transport or status
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// PDF could not be turned into text
    #[error("Extraction error for {context}: {message}")]
    Extraction { context: String, message: String },

    /// Persisting fingerprints or artifacts failed
    #[error("Store error for {context}: {message}")]
    Store { context: String, message: String },

    /// Notification delivery failed
    #[error("Notify error: {0}")]
    Notify(String),

    /// Notification channel rejected our credentials
    #[error("Authentication error: {0}")]
    Auth(String),
}

/// Processing stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Extract,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Store => "store",
        };
        f.write_str(s)
    }
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an extraction error with context.
    pub fn extraction(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Extraction {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a store error with context.
    pub fn store(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Store {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Transport failures, timeouts, 5xx, 408 and 429 are transient;
    /// robots.txt refusals and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Http(e) => {
                if let Some(status) = e.status() {
                    is_retryable_status(status.as_u16())
                } else {
                    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
                }
            }
            AppError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// The processing stage this error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            AppError::Http(_)
            | AppError::Url(_)
            | AppError::Status { .. }
            | AppError::RobotsDisallowed(_)
            | AppError::Fetch { .. } => Stage::Fetch,
            AppError::Extraction { .. } => Stage::Extract,
            _ => Stage::Store,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retryability() {
        let server = AppError::Status {
            url: "https://example.com/a.pdf".into(),
            status: 503,
        };
        let throttled = AppError::Status {
            url: "https://example.com/a.pdf".into(),
            status: 429,
        };
        let missing = AppError::Status {
            url: "https://example.com/a.pdf".into(),
            status: 404,
        };
        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_robots_not_retryable() {
        let err = AppError::RobotsDisallowed("https://example.com/private.pdf".into());
        assert!(!err.is_retryable());
        assert_eq!(err.stage(), Stage::Fetch);
    }

    #[test]
    fn test_stage_attribution() {
        assert_eq!(AppError::extraction("a", "bad xref").stage(), Stage::Extract);
        assert_eq!(AppError::store("a", "disk full").stage(), Stage::Store);
        assert_eq!(
            AppError::Io(std::io::Error::other("boom")).stage(),
            Stage::Store
        );
        assert_eq!(AppError::fetch("a", "not a pdf").stage(), Stage::Fetch);
    }
}
