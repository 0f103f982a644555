// src/models/change.rs

//! Change records produced by comparing observations against stored state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Fingerprint;

/// Classification of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// No fingerprint was stored for the document
    New,
    /// Same bytes, or the server confirmed nothing changed
    Unchanged,
    /// Content hash differs from the stored fingerprint
    Changed,
    /// Metadata suggests a change but no bytes were hashed
    Ambiguous,
}

impl ChangeKind {
    /// Kinds that trigger extraction and notification.
    pub fn is_actionable(self) -> bool {
        matches!(self, ChangeKind::New | ChangeKind::Changed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::New => "NEW",
            ChangeKind::Unchanged => "UNCHANGED",
            ChangeKind::Changed => "CHANGED",
            ChangeKind::Ambiguous => "AMBIGUOUS",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one comparison for one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    pub document_id: String,

    /// Stored fingerprint before this observation
    pub previous: Option<Fingerprint>,

    /// Fingerprint after this observation; `None` only for `Ambiguous`
    pub current: Option<Fingerprint>,

    pub kind: ChangeKind,
}

impl ChangeRecord {
    pub fn previous_hash(&self) -> Option<&str> {
        self.previous.as_ref().map(|fp| fp.content_hash.as_str())
    }

    pub fn new_hash(&self) -> Option<&str> {
        self.current.as_ref().map(|fp| fp.content_hash.as_str())
    }

    /// Flatten into a change log line.
    pub fn log_entry(&self, timestamp: DateTime<Utc>) -> ChangeLogEntry {
        ChangeLogEntry {
            document_id: self.document_id.clone(),
            previous_hash: self.previous_hash().map(str::to_string),
            new_hash: self.new_hash().map(str::to_string),
            kind: self.kind,
            timestamp,
        }
    }
}

/// One line of `changes.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeLogEntry {
    pub document_id: String,
    pub previous_hash: Option<String>,
    pub new_hash: Option<String>,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Validators;

    #[test]
    fn test_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ChangeKind::Changed).unwrap(), "\"CHANGED\"");
        let kind: ChangeKind = serde_json::from_str("\"AMBIGUOUS\"").unwrap();
        assert_eq!(kind, ChangeKind::Ambiguous);
    }

    #[test]
    fn test_actionable_kinds() {
        assert!(ChangeKind::New.is_actionable());
        assert!(ChangeKind::Changed.is_actionable());
        assert!(!ChangeKind::Unchanged.is_actionable());
        assert!(!ChangeKind::Ambiguous.is_actionable());
    }

    #[test]
    fn test_log_entry_for_first_observation() {
        let now = Utc::now();
        let record = ChangeRecord {
            document_id: "a".into(),
            previous: None,
            current: Some(Fingerprint::from_bytes(b"one", Validators::default(), now)),
            kind: ChangeKind::New,
        };
        let entry = record.log_entry(now);
        assert_eq!(entry.previous_hash, None);
        assert_eq!(entry.new_hash.as_deref(), record.new_hash());
        assert_eq!(entry.kind, ChangeKind::New);
    }
}
