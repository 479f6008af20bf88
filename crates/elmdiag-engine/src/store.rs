//! Scan stores
//!
//! [`InMemoryScanStore`] for tests and one-shot runs, [`JsonFileScanStore`]
//! for keeping history between CLI invocations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use elmdiag_core::{CoreError, CoreResult, ScanSnapshot, ScanStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A snapshot with the id it was saved under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScan {
    pub id: String,
    pub snapshot: ScanSnapshot,
}

fn newest_first(scans: &[StoredScan], count: usize) -> Vec<ScanSnapshot> {
    scans
        .iter()
        .rev()
        .take(count)
        .map(|s| s.snapshot.clone())
        .collect()
}

/// Volatile store, oldest scan first
#[derive(Debug, Default)]
pub struct InMemoryScanStore {
    scans: RwLock<Vec<StoredScan>>,
}

impl InMemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<ScanSnapshot> {
        self.scans
            .read()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.snapshot.clone())
    }
}

#[async_trait]
impl ScanStore for InMemoryScanStore {
    async fn save_scan(&self, snapshot: &ScanSnapshot) -> CoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.scans.write().push(StoredScan {
            id: id.clone(),
            snapshot: snapshot.clone(),
        });
        Ok(id)
    }

    async fn recent_scans(&self, count: usize) -> CoreResult<Vec<ScanSnapshot>> {
        Ok(newest_first(&self.scans.read(), count))
    }
}

/// History kept as one JSON array in a file, oldest scan first
pub struct JsonFileScanStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFileScanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored scan, oldest first; a missing file is an empty history
    pub async fn load_all(&self) -> CoreResult<Vec<StoredScan>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CoreError::Storage(format!(
                "Failed to read '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_all(&self, scans: &[StoredScan]) -> CoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CoreError::Storage(format!("Failed to create '{}': {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(scans)?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            CoreError::Storage(format!("Failed to write '{}': {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl ScanStore for JsonFileScanStore {
    async fn save_scan(&self, snapshot: &ScanSnapshot) -> CoreResult<String> {
        let _guard = self.lock.lock().await;
        let mut scans = self.load_all().await?;
        let id = uuid::Uuid::new_v4().to_string();
        scans.push(StoredScan {
            id: id.clone(),
            snapshot: snapshot.clone(),
        });
        self.write_all(&scans).await?;
        tracing::debug!(path = %self.path.display(), %id, "Scan saved");
        Ok(id)
    }

    async fn recent_scans(&self, count: usize) -> CoreResult<Vec<ScanSnapshot>> {
        let _guard = self.lock.lock().await;
        Ok(newest_first(&self.load_all().await?, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elmdiag_core::{DtcCode, DtcSource, ParsedDtc};
    use std::time::Duration;
    use tempfile::TempDir;

    fn snapshot(code: &str) -> ScanSnapshot {
        let dtc = ParsedDtc::new(DtcCode::parse(code).unwrap(), &code[1..], DtcSource::Obd);
        ScanSnapshot::new(None, vec![dtc], 10, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_in_memory_newest_first() {
        let store = InMemoryScanStore::new();
        let first = store.save_scan(&snapshot("P0101")).await.unwrap();
        store.save_scan(&snapshot("P0300")).await.unwrap();

        let recent = store.recent_scans(5).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].dtcs()[0].code.as_str(), "P0300");
        assert_eq!(store.recent_scans(1).await.unwrap().len(), 1);
        assert_eq!(store.get(&first).as_ref(), Some(&recent[1]));
    }

    #[tokio::test]
    async fn test_json_file_persists_between_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history").join("scans.json");

        let store = JsonFileScanStore::new(&path);
        assert!(store.recent_scans(1).await.unwrap().is_empty());
        store.save_scan(&snapshot("P0101")).await.unwrap();
        store.save_scan(&snapshot("C0420")).await.unwrap();

        let reopened = JsonFileScanStore::new(&path);
        let recent = reopened.recent_scans(2).await.unwrap();
        assert_eq!(recent[0].dtcs()[0].code.as_str(), "C0420");
        assert_eq!(recent[1].dtcs()[0].code.as_str(), "P0101");
        assert_eq!(reopened.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_json_file_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scans.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileScanStore::new(&path);
        assert!(matches!(
            store.recent_scans(1).await,
            Err(CoreError::Serialization(_))
        ));
    }
}
