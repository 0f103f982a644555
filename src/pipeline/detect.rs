//! Change detection for monitored documents.
//!
//! Classifies one observation of a document against its stored fingerprint.
//! A hash computed from downloaded bytes is always authoritative; HTTP
//! validators are only consulted when no bytes were retrieved.

use chrono::{DateTime, Utc};

use crate::models::{ChangeKind, ChangeRecord, Fingerprint, Validators};

/// What a single check learned about a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Bytes were downloaded and hashed
    Content(Fingerprint),
    /// The server answered 304 to a conditional request
    NotModified,
    /// Headers only (HEAD probe), no bytes
    Metadata {
        validators: Validators,
        content_length: Option<u64>,
        observed_at: DateTime<Utc>,
    },
}

/// Classify an observation against the stored fingerprint.
///
/// Pure and deterministic: the same inputs always yield the same record.
pub fn detect_change(
    document_id: &str,
    previous: Option<&Fingerprint>,
    observation: &Observation,
) -> ChangeRecord {
    let (kind, current) = match (previous, observation) {
        (None, Observation::Content(fp)) => (ChangeKind::New, Some(fp.clone())),
        (Some(prev), Observation::Content(fp)) => {
            if prev.same_content(fp) {
                (ChangeKind::Unchanged, Some(fp.clone()))
            } else {
                (ChangeKind::Changed, Some(fp.clone()))
            }
        }
        (Some(prev), Observation::NotModified) => (ChangeKind::Unchanged, Some(prev.clone())),
        (None, Observation::NotModified) => (ChangeKind::Ambiguous, None),
        (
            Some(prev),
            Observation::Metadata {
                validators,
                content_length,
                observed_at,
            },
        ) => {
            if metadata_matches(prev, validators, *content_length) {
                let current = Fingerprint {
                    observed_at: *observed_at,
                    ..prev.clone()
                };
                (ChangeKind::Unchanged, Some(current))
            } else {
                (ChangeKind::Ambiguous, None)
            }
        }
        (None, Observation::Metadata { .. }) => (ChangeKind::Ambiguous, None),
    };

    ChangeRecord {
        document_id: document_id.to_string(),
        previous: previous.cloned(),
        current,
        kind,
    }
}

/// Whether header-only signals agree with the stored fingerprint.
///
/// Requires an ETag or Last-Modified present on both sides and equal.
/// Content-Length alone never proves identity. Any disagreement, or a
/// signal that vanished or appeared since the last observation, counts as a
/// mismatch.
fn metadata_matches(prev: &Fingerprint, validators: &Validators, content_length: Option<u64>) -> bool {
    let etag_agrees = validators.etag.is_some() && validators.etag == prev.validators.etag;
    let date_agrees =
        validators.last_modified.is_some() && validators.last_modified == prev.validators.last_modified;
    if !etag_agrees && !date_agrees {
        return false;
    }
    if validators.etag != prev.validators.etag {
        return false;
    }
    if validators.last_modified != prev.validators.last_modified {
        return false;
    }
    if let Some(len) = content_length {
        if len != prev.size {
            return false;
        }
    }
    true
}
