//! Local filesystem storage implementation.
//!
//! Raw documents and extracted content are addressed by `(id, hash)` and
//! written once. Every write goes through a temp file and a rename so a
//! reader never observes a partial file.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── documents/{id}/{hash}.pdf
//! ├── extracted/{id}/{hash}.json
//! ├── extracted/{id}/{hash}.md
//! ├── extracted/{id}/{hash}.txt
//! └── metadata/
//!     ├── changes.jsonl
//!     └── last_run_summary.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ChangeLogEntry, ExtractedContent, ExtractionConfig, RunSummary};
use crate::storage::ArtifactStore;

pub const CHANGE_LOG_KEY: &str = "metadata/changes.jsonl";
pub const SUMMARY_KEY: &str = "metadata/last_run_summary.json";
pub const FINGERPRINTS_KEY: &str = "metadata/fingerprints.json";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn raw_key(id: &str, hash: &str) -> String {
        format!("documents/{id}/{hash}.pdf")
    }

    fn extracted_key(id: &str, hash: &str, ext: &str) -> String {
        format!("extracted/{id}/{hash}.{ext}")
    }

    /// Write bytes atomically (write to temp, then rename).
    pub async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.path(key), bytes).await
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    pub async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(key)).await?)
    }

    /// Read the whole change log.
    pub async fn load_change_log(&self) -> Result<Vec<ChangeLogEntry>> {
        let Some(bytes) = self.read_bytes(CHANGE_LOG_KEY).await? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut entries = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    /// Load the summary of the last run that found changes.
    pub async fn load_summary(&self) -> Result<Option<RunSummary>> {
        self.read_json(SUMMARY_KEY).await
    }
}

#[async_trait]
impl ArtifactStore for LocalStorage {
    async fn write_raw(&self, id: &str, hash: &str, bytes: &[u8]) -> Result<bool> {
        let key = Self::raw_key(id, hash);
        if self.exists(&key).await? {
            log::debug!("Raw document already stored at {}", key);
            return Ok(false);
        }
        self.write_bytes(&key, bytes)
            .await
            .map_err(|e| AppError::store(&key, e))?;
        log::info!("Stored {} bytes at {}", bytes.len(), key);
        Ok(true)
    }

    async fn has_extracted(&self, id: &str, hash: &str) -> Result<bool> {
        self.exists(&Self::extracted_key(id, hash, "json")).await
    }

    async fn write_extracted(
        &self,
        content: &ExtractedContent,
        markdown: Option<&str>,
        options: &ExtractionConfig,
    ) -> Result<()> {
        let id = &content.document_id;
        let hash = &content.content_hash;
        let json_key = Self::extracted_key(id, hash, "json");
        if self.exists(&json_key).await? {
            log::debug!("Extracted content already stored at {}", json_key);
            return Ok(());
        }

        // Renderings first; the JSON marks the pair as extracted.
        if options.write_text {
            let key = Self::extracted_key(id, hash, "txt");
            self.write_bytes(&key, content.text.as_bytes())
                .await
                .map_err(|e| AppError::store(&key, e))?;
        }
        if let (true, Some(md)) = (options.write_markdown, markdown) {
            let key = Self::extracted_key(id, hash, "md");
            self.write_bytes(&key, md.as_bytes())
                .await
                .map_err(|e| AppError::store(&key, e))?;
        }
        self.write_json(&json_key, content)
            .await
            .map_err(|e| AppError::store(&json_key, e))?;

        log::info!("Extracted content written to {}", json_key);
        Ok(())
    }

    async fn append_change_log(&self, entries: &[ChangeLogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        let path = self.path(CHANGE_LOG_KEY);
        ensure_parent(&path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AppError::store(CHANGE_LOG_KEY, e))?;
        file.write_all(&buf)
            .await
            .map_err(|e| AppError::store(CHANGE_LOG_KEY, e))?;
        file.flush().await?;
        Ok(())
    }

    async fn write_summary(&self, summary: &RunSummary) -> Result<()> {
        self.write_json(SUMMARY_KEY, summary)
            .await
            .map_err(|e| AppError::store(SUMMARY_KEY, e))
    }
}

/// Ensure parent directory exists.
pub(crate) async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Write a file through a sibling temp file and rename.
///
/// On failure the temp file is removed (best effort) and the target is left
/// as it was.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path).await?;

    let tmp = tmp_path(path);
    let result = write_then_rename(&tmp, path, bytes).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::debug!("Could not remove {}: {}", tmp.display(), e);
            }
        }
    }
    result
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    path.with_file_name(tmp_name)
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(tmp, path).await?;
    Ok(())
}
