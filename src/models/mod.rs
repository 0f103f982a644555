// src/models/mod.rs

//! Domain models for the document monitor.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod change;
mod config;
mod document;
mod extracted;
mod fingerprint;
mod summary;

// Re-export all public types
pub use change::{ChangeKind, ChangeLogEntry, ChangeRecord};
pub use config::{
    CheckMode, Config, DiscoveryConfig, ExtractionConfig, MIN_REQUEST_INTERVAL_SECS,
    MonitorConfig, NotifierConfig, NotifierKind, PathsConfig,
};
pub use document::{DocumentDescriptor, DocumentList, derive_id};
pub use extracted::{AreaOfOperation, DocumentMetadata, ExtractedContent, Section, Standards, Task};
pub use fingerprint::{Fingerprint, Validators, content_hash};
pub use summary::{DocumentFailure, DocumentOutcome, NotificationStatus, RunSummary};
