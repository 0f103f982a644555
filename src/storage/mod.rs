//! Storage abstractions for fingerprints and document artifacts.
//!
//! ## Directory Structure
//!
//! ```text
//! data/
//! ├── metadata/
//! │   ├── fingerprints.json     # id -> last known fingerprint
//! │   ├── changes.jsonl         # append-only change log
//! │   └── last_run_summary.json # written when a run finds changes
//! ├── documents/                # raw PDFs, write-once
//! │   └── {id}/{hash}.pdf
//! └── extracted/                # extractor output, write-once
//!     └── {id}/{hash}.json (.md, .txt)
//! ```

pub mod fingerprints;
pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChangeLogEntry, ExtractedContent, ExtractionConfig, Fingerprint, RunSummary};

// Re-export for convenience
pub use fingerprints::JsonFingerprintStore;
pub use local::LocalStorage;
pub use memory::MemoryFingerprintStore;

/// Keyed store of the current fingerprint per document.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Stored fingerprint, or `None` for an unknown id.
    async fn get(&self, id: &str) -> Result<Option<Fingerprint>>;

    /// Replace the fingerprint for `id`. Either fully visible to later
    /// `get` calls or not at all.
    async fn put(&self, id: &str, fingerprint: Fingerprint) -> Result<()>;

    /// All entries, ordered by id.
    async fn list(&self) -> Result<Vec<(String, Fingerprint)>>;
}

/// Write-once storage for raw documents, extracted content and run records.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store raw bytes under `(id, hash)`. Returns `false` if already present.
    async fn write_raw(&self, id: &str, hash: &str, bytes: &[u8]) -> Result<bool>;

    /// Whether extracted content exists for `(id, hash)`.
    async fn has_extracted(&self, id: &str, hash: &str) -> Result<bool>;

    /// Store extracted content; never overwrites an existing `(id, hash)`.
    async fn write_extracted(
        &self,
        content: &ExtractedContent,
        markdown: Option<&str>,
        options: &ExtractionConfig,
    ) -> Result<()>;

    /// Append entries to the change log.
    async fn append_change_log(&self, entries: &[ChangeLogEntry]) -> Result<()>;

    /// Persist the summary of a run.
    async fn write_summary(&self, summary: &RunSummary) -> Result<()>;
}
