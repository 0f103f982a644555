//! Pipeline entry points for monitoring runs.
//!
//! - `detect_change`: Classify one observation against a stored fingerprint
//! - `Monitor`: Fetch, detect, extract and persist a batch of documents

pub mod detect;
pub mod monitor;

pub use detect::{Observation, detect_change};
pub use monitor::Monitor;
