//! In-memory fingerprint store for tests and dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::Fingerprint;
use crate::storage::FingerprintStore;

#[derive(Default)]
pub struct MemoryFingerprintStore {
    entries: Mutex<BTreeMap<String, Fingerprint>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from existing entries, e.g. a snapshot of the on-disk store.
    pub fn with_entries(entries: impl IntoIterator<Item = (String, Fingerprint)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }
}

#[async_trait]
impl FingerprintStore for MemoryFingerprintStore {
    async fn get(&self, id: &str) -> Result<Option<Fingerprint>> {
        Ok(self.entries.lock().await.get(id).cloned())
    }

    async fn put(&self, id: &str, fingerprint: Fingerprint) -> Result<()> {
        self.entries.lock().await.insert(id.to_string(), fingerprint);
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
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryFingerprintStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        let fp = Fingerprint::from_bytes(b"x", Validators::default(), Utc::now());
        store.put("a", fp.clone()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(fp));
    }
}
