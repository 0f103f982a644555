//! JSON file backed fingerprint store.
//!
//! The whole mapping lives in one file and is rewritten on every `put`
//! through a temp file and rename. The in-memory view only changes after
//! the file write succeeded, so a failed `put` leaves the previous
//! fingerprint in place for both this process and the next run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::Fingerprint;
use crate::storage::FingerprintStore;
use crate::storage::local::write_atomic;

const FORMAT_VERSION: u32 = 1;

/// On-disk shape of `fingerprints.json`.
#[derive(Debug, Serialize, Deserialize)]
struct FingerprintFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    documents: BTreeMap<String, Fingerprint>,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

pub struct JsonFingerprintStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Fingerprint>>,
}

impl JsonFingerprintStore {
    /// Open the store, starting empty if the file does not exist yet.
    ///
    /// A file that exists but cannot be parsed is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: FingerprintFile = serde_json::from_slice(&bytes).map_err(|e| {
                    AppError::store(path.display().to_string(), format!("unreadable: {e}"))
                })?;
                if file.version > FORMAT_VERSION {
                    log::warn!(
                        "Fingerprint file {} has version {}, newer than {}",
                        path.display(),
                        file.version,
                        FORMAT_VERSION
                    );
                }
                file.documents
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No fingerprint store at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(AppError::store(path.display().to_string(), e)),
        };

        log::debug!("Loaded {} fingerprints from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, documents: &BTreeMap<String, Fingerprint>) -> Result<()> {
        let file = FingerprintFileRef {
            version: FORMAT_VERSION,
            documents,
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &bytes).await
    }
}

#[derive(Serialize)]
struct FingerprintFileRef<'a> {
    version: u32,
    documents: &'a BTreeMap<String, Fingerprint>,
}

#[async_trait]
impl FingerprintStore for JsonFingerprintStore {
    async fn get(&self, id: &str) -> Result<Option<Fingerprint>> {
        Ok(self.entries.lock().await.get(id).cloned())
    }

    async fn put(&self, id: &str, fingerprint: Fingerprint) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(id.to_string(), fingerprint);

        self.persist(&next)
            .await
            .map_err(|e| AppError::store(format!("fingerprint {id}"), e))?;
        *entries = next;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, Fingerprint)>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .map(|(id, fp)| (id.clone(), fp.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Validators;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn fingerprint(bytes: &[u8]) -> Fingerprint {
        Fingerprint::from_bytes(
            bytes,
            Validators {
                etag: Some("\"abc\"".into()),
                last_modified: None,
            },
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFingerprintStore::open(tmp.path().join("metadata/fingerprints.json"))
            .await
            .unwrap();

        let fp = fingerprint(b"v1");
        store.put("a", fp.clone()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(fp));
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFingerprintStore::open(tmp.path().join("fingerprints.json"))
            .await
            .unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_survives_reopen_and_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fingerprints.json");

        let store = JsonFingerprintStore::open(&path).await.unwrap();
        store.put("a", fingerprint(b"v1")).await.unwrap();
        store.put("a", fingerprint(b"v2")).await.unwrap();
        store.put("b", fingerprint(b"other")).await.unwrap();
        drop(store);

        let reopened = JsonFingerprintStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), Some(fingerprint(b"v2")));
        let all = reopened.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "a");
    }

    #[tokio::test]
    async fn test_reads_records_without_optional_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fingerprints.json");
        tokio::fs::write(
            &path,
            r#"{ "documents": { "a": {
                "content_hash": "00ff",
                "size": 2,
                "observed_at": "2025-01-01T00:00:00Z",
                "extra_field": true
            } } }"#,
        )
        .await
        .unwrap();

        let store = JsonFingerprintStore::open(&path).await.unwrap();
        let fp = store.get("a").await.unwrap().unwrap();
        assert_eq!(fp.content_hash, "00ff");
        assert!(fp.validators.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fingerprints.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        assert!(JsonFingerprintStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_put_keeps_previous_value() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fingerprints.json");
        let store = JsonFingerprintStore::open(&path).await.unwrap();
        store.put("a", fingerprint(b"v1")).await.unwrap();

        // A directory where the temp file should go makes the write fail.
        std::fs::create_dir(tmp.path().join("fingerprints.json.tmp")).unwrap();

        assert!(store.put("a", fingerprint(b"v2")).await.is_err());
        assert_eq!(store.get("a").await.unwrap(), Some(fingerprint(b"v1")));
    }
}
