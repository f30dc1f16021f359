//! File-level bookkeeping types
//!
//! One record per ingested source document, plus the corpus-wide
//! statistics derived from them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate bookkeeping for one ingested source file.
///
/// `chunk_count` always equals the number of chunks currently stored for
/// this `filepath`; it is recomputed inside the same transaction that
/// upserts the chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Primary key: path-like identifier of the source
    pub filepath: String,

    /// File name without directories
    pub filename: String,

    /// Size of the cleaned source text, in bytes
    pub file_size: i64,

    /// Number of chunks currently stored for this file
    pub chunk_count: i64,

    /// Last modification time, if known
    pub last_modified: Option<DateTime<Utc>>,

    /// First ingestion time
    pub ingested_at: DateTime<Utc>,
}

/// Summary entry for the paginated file listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub filename: String,
    pub filepath: String,
    pub size: i64,
    pub modified_date: Option<String>,
    /// Lowercased extension without the dot, `"unknown"` when absent
    pub file_type: String,
    pub chunks_count: i64,
}

/// One page of the file listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePage {
    pub files: Vec<FileSummary>,
    pub total_files: i64,
    pub offset: i64,
    pub limit: i64,
}

/// Corpus-wide statistics.
///
/// Everything except `vector_count` is computed from relational
/// aggregates; `vector_count` reflects the live in-memory embedding map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CorpusStats {
    pub total_files: i64,
    pub total_chunks: i64,
    pub total_size_mb: f64,
    /// Per-extension file counts, lowercased, `"unknown"` for extensionless
    pub file_types: HashMap<String, i64>,
    /// Most recent ingestion timestamp, RFC 3339
    pub last_updated: Option<String>,
    pub vector_count: usize,
}
