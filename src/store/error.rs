//! Vector store error types

use thiserror::Error;

/// Vector store specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("chunk/embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("snapshot write failed: {reason}")]
    Snapshot { reason: String },

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Check if the error is worth retrying.
    ///
    /// Validation failures never are; persistence hiccups usually are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_)
                | StoreError::Sqlite(_)
                | StoreError::Snapshot { .. }
                | StoreError::Io(_)
        )
    }
}
