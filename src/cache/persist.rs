//! Cache Persistence Module
//!
//! JSON snapshot of entries whose policy asks to survive restarts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheEntry;
use crate::error::Result;

/// Bumped whenever the on-disk layout changes; other versions are ignored.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub key: String,
    pub entry: CacheEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    /// Unix milliseconds at which the snapshot was taken
    pub saved_at: u64,
    pub entries: Vec<PersistedEntry>,
}

impl CacheSnapshot {
    pub fn new(entries: Vec<PersistedEntry>, saved_at: u64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at,
            entries,
        }
    }

    /// Writes the snapshot, replacing the file atomically via a temp file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = path.with_extension("tmp");
        let raw = serde_json::to_vec(self)?;
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), entries = self.entries.len(), "cache snapshot saved");
        Ok(())
    }

    /// Reads a snapshot. A missing file or a foreign version yields `None`.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot: CacheSnapshot = serde_json::from_slice(&raw)?;
        if snapshot.version != SNAPSHOT_VERSION {
            debug!(
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "ignoring cache snapshot with unknown version"
            );
            return Ok(None);
        }
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use serde_json::json;

    fn sample() -> CacheSnapshot {
        CacheSnapshot::new(
            vec![PersistedEntry {
                key: "/brands::customer=c1".to_string(),
                entry: CacheEntry::new(json!({"id": 1}), CachePolicy::minutes(60, 720, 1440, true), 42),
            }],
            100,
        )
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("snapshot.json");

        sample().save(&path).await.unwrap();
        let loaded = CacheSnapshot::load(&path).await.unwrap();

        assert_eq!(loaded, Some(sample()));
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CacheSnapshot::load(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_unknown_version_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut snapshot = sample();
        snapshot.version = 99;
        tokio::fs::write(&path, serde_json::to_vec(&snapshot).unwrap())
            .await
            .unwrap();

        assert!(CacheSnapshot::load(&path).await.unwrap().is_none());
    }
}
