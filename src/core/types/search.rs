//! Search result types

use serde::{Deserialize, Serialize};

use super::chunk::ChunkRecord;

/// A raw similarity hit: chunk identifier plus cosine score.
///
/// Transient value, never persisted. Scores are in `[0, 1]` for
/// non-negative embeddings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
}

/// A similarity hit joined with its chunk row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub record: ChunkRecord,
    pub score: f32,
}
