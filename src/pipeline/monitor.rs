// src/pipeline/monitor.rs

//! Batch orchestration of one monitoring run.
//!
//! Documents are processed one at a time. Each yields a tagged outcome and
//! errors never cross document boundaries. A fingerprint is only advanced
//! after the document's artifacts and change-log entry are on disk.

use std::collections::HashMap;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{
    ChangeKind, ChangeRecord, CheckMode, Config, DocumentDescriptor, DocumentFailure,
    DocumentOutcome, Fingerprint, NotificationStatus, RunSummary,
};
use crate::pipeline::detect::{Observation, detect_change};
use crate::services::{DocumentSource, Extractor, FetchOutcome, Notifier, render_notification};
use crate::storage::{ArtifactStore, FingerprintStore};
use crate::utils::retry::{RetryPolicy, with_retry};

/// Runs the fetch, detect, extract and persist cycle over a document list.
pub struct Monitor<'a> {
    config: &'a Config,
    source: &'a dyn DocumentSource,
    fingerprints: &'a dyn FingerprintStore,
    artifacts: &'a dyn ArtifactStore,
    extractor: &'a dyn Extractor,
    notifier: &'a dyn Notifier,
    retry: RetryPolicy,
}

/// A classified observation plus the bytes behind it, if any were fetched.
struct Checked {
    record: ChangeRecord,
    bytes: Option<Vec<u8>>,
}

impl<'a> Monitor<'a> {
    pub fn new(
        config: &'a Config,
        source: &'a dyn DocumentSource,
        fingerprints: &'a dyn FingerprintStore,
        artifacts: &'a dyn ArtifactStore,
        extractor: &'a dyn Extractor,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            source,
            fingerprints,
            artifacts,
            extractor,
            notifier,
            retry: RetryPolicy::from_config(&config.monitor),
        }
    }

    /// Process every document, notify once, and return the run summary.
    ///
    /// Fails only when the notifier rejects its credentials up front.
    pub async fn run(&self, documents: &[DocumentDescriptor]) -> Result<RunSummary> {
        let started_at = Utc::now();

        match self.notifier.preflight().await {
            Ok(()) => {}
            Err(e @ AppError::Auth(_)) => return Err(e),
            Err(e) => log::warn!("Notifier {} preflight failed: {}", self.notifier.name(), e),
        }

        log::info!("Checking {} documents", documents.len());
        let mut outcomes = Vec::with_capacity(documents.len());
        for (i, doc) in documents.iter().enumerate() {
            log::info!("[{}/{}] {}", i + 1, documents.len(), doc.display_name());
            let outcome = match self.process(doc).await {
                Ok(record) => {
                    log::info!("  {} -> {}", doc.id, record.kind);
                    DocumentOutcome::Checked(record)
                }
                Err(e) => {
                    log::error!("  {} failed: {}", doc.id, e);
                    DocumentOutcome::Failed(DocumentFailure::from_error(&doc.id, &e))
                }
            };
            outcomes.push(outcome);
        }

        let mut summary = RunSummary::from_outcomes(started_at, outcomes);
        if summary.has_changes() {
            summary.notification = self.notify(documents, &summary.changes).await;
            if let Err(e) = self.artifacts.write_summary(&summary).await {
                log::error!("Failed to write run summary: {}", e);
            }
        }

        log::info!(
            "Run complete: {} new, {} changed, {} unchanged, {} failed",
            summary.new,
            summary.changed,
            summary.unchanged,
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Check one document and persist it if it is new or changed.
    async fn process(&self, doc: &DocumentDescriptor) -> Result<ChangeRecord> {
        let previous = self
            .fingerprints
            .get(&doc.id)
            .await
            .map_err(|e| store_error(&doc.id, e))?;

        let Checked { record, bytes } = self.check(doc, previous.as_ref()).await?;

        match record.kind {
            ChangeKind::New | ChangeKind::Changed => {
                let bytes = bytes
                    .ok_or_else(|| AppError::fetch(&doc.id, "no content behind a content change"))?;
                self.persist(doc, &record, &bytes).await?;
            }
            ChangeKind::Unchanged => self.refresh_validators(doc, &record).await,
            ChangeKind::Ambiguous => {
                return Err(AppError::fetch(&doc.id, "change could not be determined"));
            }
        }
        Ok(record)
    }

    /// Observe the document and classify it, re-fetching when ambiguous.
    async fn check(&self, doc: &DocumentDescriptor, previous: Option<&Fingerprint>) -> Result<Checked> {
        if self.config.monitor.check_mode == CheckMode::Head && previous.is_some() {
            let label = format!("HEAD {}", doc.id);
            match with_retry(&self.retry, &label, || self.source.probe(doc)).await {
                Ok(probe) => {
                    let observation = Observation::Metadata {
                        validators: probe.validators,
                        content_length: probe.content_length,
                        observed_at: probe.observed_at,
                    };
                    let record = detect_change(&doc.id, previous, &observation);
                    if record.kind == ChangeKind::Unchanged {
                        return Ok(Checked { record, bytes: None });
                    }
                    log::debug!("  probe inconclusive for {}, downloading", doc.id);
                }
                Err(e) => log::warn!("  HEAD failed for {}: {}. Falling back to GET", doc.id, e),
            }
            return self.fetch_and_detect(doc, previous, false).await;
        }

        let checked = self.fetch_and_detect(doc, previous, true).await?;
        if checked.record.kind == ChangeKind::Ambiguous {
            log::info!("  {} is ambiguous, re-fetching without validators", doc.id);
            return self.fetch_and_detect(doc, previous, false).await;
        }
        Ok(checked)
    }

    async fn fetch_and_detect(
        &self,
        doc: &DocumentDescriptor,
        previous: Option<&Fingerprint>,
        conditional: bool,
    ) -> Result<Checked> {
        let validators = previous
            .filter(|_| conditional)
            .map(|fp| &fp.validators)
            .filter(|v| !v.is_empty());

        let label = format!("GET {}", doc.id);
        let outcome = with_retry(&self.retry, &label, || self.source.fetch(doc, validators)).await?;

        Ok(match outcome {
            FetchOutcome::NotModified => Checked {
                record: detect_change(&doc.id, previous, &Observation::NotModified),
                bytes: None,
            },
            FetchOutcome::Fetched(fetched) => {
                let fingerprint =
                    Fingerprint::from_bytes(&fetched.bytes, fetched.validators, fetched.fetched_at);
                Checked {
                    record: detect_change(&doc.id, previous, &Observation::Content(fingerprint)),
                    bytes: Some(fetched.bytes),
                }
            }
        })
    }

    /// Store raw bytes, extract, log the change, then advance the fingerprint.
    async fn persist(&self, doc: &DocumentDescriptor, record: &ChangeRecord, bytes: &[u8]) -> Result<()> {
        let fingerprint = record
            .current
            .clone()
            .ok_or_else(|| AppError::fetch(&doc.id, "missing fingerprint for content change"))?;
        let hash = fingerprint.content_hash.as_str();

        self.artifacts
            .write_raw(&doc.id, hash, bytes)
            .await
            .map_err(|e| store_error(&doc.id, e))?;

        let already_extracted = self
            .artifacts
            .has_extracted(&doc.id, hash)
            .await
            .map_err(|e| store_error(&doc.id, e))?;
        if already_extracted {
            log::info!("  extraction for {} already present, skipping", fingerprint.short_hash());
        } else {
            let content = self.extractor.extract(&doc.id, hash, bytes)?;
            log::info!(
                "  extracted {} words, {} sections",
                content.word_count,
                content.sections.len()
            );
            let options = &self.config.extraction;
            let markdown = options
                .write_markdown
                .then(|| content.to_markdown(doc.display_name(), &doc.url));
            self.artifacts
                .write_extracted(&content, markdown.as_deref(), options)
                .await
                .map_err(|e| store_error(&doc.id, e))?;
        }

        self.artifacts
            .append_change_log(&[record.log_entry(Utc::now())])
            .await
            .map_err(|e| store_error(&doc.id, e))?;

        self.fingerprints
            .put(&doc.id, fingerprint)
            .await
            .map_err(|e| store_error(&doc.id, e))
    }

    /// Keep stored validators current when the content itself is unchanged.
    async fn refresh_validators(&self, doc: &DocumentDescriptor, record: &ChangeRecord) {
        let (Some(prev), Some(current)) = (&record.previous, &record.current) else {
            return;
        };
        if prev.validators == current.validators {
            return;
        }
        if let Err(e) = self.fingerprints.put(&doc.id, current.clone()).await {
            log::warn!("  could not refresh validators for {}: {}", doc.id, e);
        }
    }

    async fn notify(&self, documents: &[DocumentDescriptor], changes: &[ChangeRecord]) -> NotificationStatus {
        let by_id: HashMap<&str, &DocumentDescriptor> =
            documents.iter().map(|d| (d.id.as_str(), d)).collect();
        let notification = render_notification(&self.config.notifier, changes, &by_id, Utc::now());

        match self.notifier.notify(&notification).await {
            Ok(()) => {
                log::info!(
                    "Notified {} about {} change(s)",
                    self.notifier.name(),
                    changes.len()
                );
                NotificationStatus::Delivered
            }
            Err(e) => {
                log::error!("Notification via {} failed: {}", self.notifier.name(), e);
                NotificationStatus::Failed(e.to_string())
            }
        }
    }
}

/// Attribute an error to the store stage, keeping existing store context.
fn store_error(document_id: &str, error: AppError) -> AppError {
    match error {
        AppError::Store { .. } => error,
        other => AppError::store(document_id, other),
    }
}
