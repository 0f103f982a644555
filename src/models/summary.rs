// src/models/summary.rs

//! Per-document outcomes and the run summary built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChangeKind, ChangeRecord};
use crate::error::{AppError, Stage};

/// A document that could not be processed this run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentFailure {
    pub document_id: String,
    pub stage: Stage,
    pub error: String,
}

impl DocumentFailure {
    pub fn from_error(document_id: &str, error: &AppError) -> Self {
        Self {
            document_id: document_id.to_string(),
            stage: error.stage(),
            error: error.to_string(),
        }
    }
}

/// Tagged result of processing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Checked(ChangeRecord),
    Failed(DocumentFailure),
}

/// What happened to the run's notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Nothing to report
    #[default]
    Skipped,
    Delivered,
    Failed(String),
}

/// Aggregate of one monitoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_documents: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    /// NEW and CHANGED records whose artifacts and fingerprint were persisted
    pub changes: Vec<ChangeRecord>,
    pub failures: Vec<DocumentFailure>,
    #[serde(default)]
    pub notification: NotificationStatus,
}

impl RunSummary {
    /// Fold per-document outcomes into a summary.
    pub fn from_outcomes(started_at: DateTime<Utc>, outcomes: Vec<DocumentOutcome>) -> Self {
        let mut summary = Self {
            started_at,
            finished_at: Utc::now(),
            total_documents: outcomes.len(),
            new: 0,
            changed: 0,
            unchanged: 0,
            changes: Vec::new(),
            failures: Vec::new(),
            notification: NotificationStatus::Skipped,
        };

        for outcome in outcomes {
            match outcome {
                DocumentOutcome::Checked(record) => {
                    match record.kind {
                        ChangeKind::New => summary.new += 1,
                        ChangeKind::Changed => summary.changed += 1,
                        ChangeKind::Unchanged => summary.unchanged += 1,
                        ChangeKind::Ambiguous => {}
                    }
                    if record.kind.is_actionable() {
                        summary.changes.push(record);
                    }
                }
                DocumentOutcome::Failed(failure) => summary.failures.push(failure),
            }
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}
