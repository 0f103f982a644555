// src/models/fingerprint.rs

//! Fingerprints: the comparable summary of a document's last known state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::http::header_str;

/// HTTP validators returned with a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Validators {
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Read `ETag` and `Last-Modified` from a header map.
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        Self {
            etag: header_str(headers, reqwest::header::ETAG),
            last_modified: header_str(headers, reqwest::header::LAST_MODIFIED),
        }
    }
}

/// Last known state of one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    /// SHA-256 of the raw bytes, lowercase hex
    pub content_hash: String,

    /// Byte length of the raw document
    pub size: u64,

    #[serde(flatten)]
    pub validators: Validators,

    /// When the bytes were observed
    pub observed_at: DateTime<Utc>,
}

impl Fingerprint {
    /// Fingerprint freshly downloaded bytes.
    pub fn from_bytes(bytes: &[u8], validators: Validators, observed_at: DateTime<Utc>) -> Self {
        Self {
            content_hash: content_hash(bytes),
            size: bytes.len() as u64,
            validators,
            observed_at,
        }
    }

    /// Whether two fingerprints describe the same bytes.
    pub fn same_content(&self, other: &Fingerprint) -> bool {
        self.content_hash == other.content_hash && self.size == other.size
    }

    /// First 16 hex characters of the hash, for display.
    pub fn short_hash(&self) -> &str {
        let end = self.content_hash.len().min(16);
        &self.content_hash[..end]
    }
}

/// SHA-256 hex digest of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
