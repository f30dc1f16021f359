//! Embedding snapshot persistence
//!
//! The in-memory embedding map is made durable as a single bincode blob,
//! replaced atomically on every durable write: serialize to a temp file,
//! then rename over the previous snapshot. A crash mid-write leaves the
//! previous snapshot intact; the orphaned temp file is discarded on the
//! next load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::error::StoreError;

/// One stored embedding with its insertion sequence number.
///
/// The sequence number makes search tie-breaks deterministic: equal
/// scores rank in insertion order. Re-inserting an existing chunk id
/// keeps its original sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEmbedding {
    pub seq: u64,
    pub vector: Vec<f32>,
}

/// The in-memory embedding map: chunk id to embedding.
pub type EmbeddingMap = HashMap<String, StoredEmbedding>;

/// Durable snapshot of the embedding map.
#[derive(Debug, Clone)]
pub struct EmbeddingSnapshot {
    path: PathBuf,
}

impl EmbeddingSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "vectors.bin".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the snapshot from disk.
    ///
    /// A missing file means a fresh store. An orphaned temp file from an
    /// interrupted write is deleted. An unreadable snapshot is reported
    /// and treated as empty rather than refusing to start.
    pub fn load(&self) -> EmbeddingMap {
        let temp_path = self.temp_path();
        if temp_path.exists() {
            warn!("discarding incomplete snapshot temp file: {:?}", temp_path);
            let _ = std::fs::remove_file(&temp_path);
        }

        if !self.path.exists() {
            info!("no existing embedding snapshot, starting fresh");
            return EmbeddingMap::new();
        }

        match std::fs::read(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| bincode::deserialize(&bytes).map_err(|e| e.to_string()))
        {
            Ok(map) => {
                let map: EmbeddingMap = map;
                info!("loaded {} embeddings from snapshot", map.len());
                map
            }
            Err(e) => {
                error!("failed to load embedding snapshot: {}", e);
                EmbeddingMap::new()
            }
        }
    }

    /// Write the map durably: temp file, then atomic rename.
    ///
    /// On failure the temp file is removed and the previous snapshot is
    /// left untouched.
    pub fn persist(&self, map: &EmbeddingMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Snapshot {
                reason: format!("failed to create snapshot directory: {}", e),
            })?;
        }

        let bytes = bincode::serialize(map).map_err(|e| StoreError::Snapshot {
            reason: format!("serialization failed: {}", e),
        })?;

        let temp_path = self.temp_path();
        let write_result = std::fs::write(&temp_path, &bytes)
            .and_then(|_| std::fs::rename(&temp_path, &self.path));

        match write_result {
            Ok(()) => {
                debug!("persisted {} embeddings to snapshot", map.len());
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(StoreError::Snapshot {
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_map() -> EmbeddingMap {
        let mut map = EmbeddingMap::new();
        map.insert(
            "doc.txt_0000".into(),
            StoredEmbedding {
                seq: 0,
                vector: vec![1.0, 0.0],
            },
        );
        map.insert(
            "doc.txt_0001".into(),
            StoredEmbedding {
                seq: 1,
                vector: vec![0.0, 1.0],
            },
        );
        map
    }

    #[test]
    fn test_load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let snapshot = EmbeddingSnapshot::new(temp.path().join("vectors.bin"));
        assert!(snapshot.load().is_empty());
    }

    #[test]
    fn test_persist_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let snapshot = EmbeddingSnapshot::new(temp.path().join("vectors.bin"));

        let map = sample_map();
        snapshot.persist(&map).unwrap();

        let loaded = snapshot.load();
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_interrupted_write_keeps_previous_state() {
        let temp = TempDir::new().unwrap();
        let snapshot = EmbeddingSnapshot::new(temp.path().join("vectors.bin"));

        let map = sample_map();
        snapshot.persist(&map).unwrap();

        // Simulate a crash mid-write: a half-written temp file is left
        // behind while the real snapshot is untouched.
        std::fs::write(snapshot.temp_path(), b"garbage").unwrap();

        let loaded = snapshot.load();
        assert_eq!(loaded, map);
        assert!(!snapshot.temp_path().exists());
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let temp = TempDir::new().unwrap();
        let snapshot = EmbeddingSnapshot::new(temp.path().join("vectors.bin"));
        std::fs::write(snapshot.path(), b"not bincode").unwrap();

        assert!(snapshot.load().is_empty());
    }

    #[test]
    fn test_persist_empty_map() {
        let temp = TempDir::new().unwrap();
        let snapshot = EmbeddingSnapshot::new(temp.path().join("vectors.bin"));

        snapshot.persist(&sample_map()).unwrap();
        snapshot.persist(&EmbeddingMap::new()).unwrap();

        assert!(snapshot.load().is_empty());
    }
}
