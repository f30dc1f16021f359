//! Vector store configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Embedding dimension (must match the embedding model output).
    /// The store refuses vectors of any other dimension.
    pub vector_size: usize,

    /// Path of the embedding snapshot file
    pub snapshot_path: PathBuf,

    /// Maximum entries in the aggregate-query cache
    pub cache_capacity: usize,

    /// Time-to-live for cached aggregates, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            vector_size: 384, // all-MiniLM-L6-v2 output dimension
            snapshot_path: directories::ProjectDirs::from("com", "corpusrag", "CorpusRAG")
                .map(|dirs| dirs.data_local_dir().join("vectors.bin"))
                .unwrap_or_else(|| PathBuf::from("data/vectors.bin")),
            cache_capacity: 1000,
            cache_ttl_secs: 300,
        }
    }
}

impl StoreConfig {
    /// Set the embedding dimension
    pub fn with_vector_size(mut self, size: usize) -> Self {
        self.vector_size = size;
        self
    }

    /// Set the snapshot file path
    pub fn with_snapshot_path(mut self, path: PathBuf) -> Self {
        self.snapshot_path = path;
        self
    }

    /// Set the aggregate cache TTL
    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }
}
