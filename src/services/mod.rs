//! Service layer for the monitor.
//!
//! - Document fetching with robots.txt and per-host spacing (`HttpFetcher`)
//! - PDF text and ACS structure extraction (`PdfExtractor`)
//! - Change notification delivery (`Notifier`)
//! - Index page scanning (`DocumentDiscovery`)

#[cfg(feature = "discover")]
pub mod discovery;
pub mod extractor;
pub mod fetcher;
pub mod notifier;
pub mod robots;

#[cfg(feature = "discover")]
pub use discovery::DocumentDiscovery;
pub use extractor::{AcsParser, Extractor, PdfExtractor};
pub use fetcher::{DocumentSource, FetchOutcome, FetchedDocument, HttpFetcher, ProbeResult};
pub use notifier::{
    FileNotifier, GithubIssueNotifier, LogNotifier, Notification, Notifier, build_notifier,
    render_notification,
};
pub use robots::RobotsRules;
