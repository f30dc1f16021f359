//! Vector store
//!
//! Persists chunk metadata relationally and embeddings in a separate
//! snapshot blob, and serves brute-force cosine similarity search over
//! the in-memory embedding map.
//!
//! Two variants with equivalent guarantees: [`VectorStore`] for async
//! callers and [`BlockingVectorStore`] for thread-based callers. Both
//! guarantee at most one writer to the embedding map at a time, searches
//! that observe a consistent snapshot of it, and durable embedding
//! persistence via atomic snapshot replacement.

pub mod cache;
pub mod config;
pub mod error;
pub mod pool;
pub mod snapshot;

mod blocking;
mod store;


pub use blocking::BlockingVectorStore;
pub use cache::{AsyncTtlCache, CacheStats, TtlCache};
pub use config::StoreConfig;
pub use error::StoreError;
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use snapshot::{EmbeddingMap, EmbeddingSnapshot, StoredEmbedding};
pub use store::VectorStore;

use crate::core::types::SearchHit;
use snapshot::EmbeddingMap as Map;

/// In-memory embedding index: the map plus the next insertion sequence.
/// Guarded by a reader-writer lock in both store variants.
pub(crate) struct EmbeddingIndex {
    pub(crate) map: Map,
    pub(crate) next_seq: u64,
}

/// Cosine similarity between two vectors: `dot(a,b) / (|a|*|b|)`.
///
/// Returns exactly `0.0` when either norm is zero instead of dividing
/// by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Rank every stored embedding against the query vector.
///
/// Linear scan, threshold filter, descending sort with insertion-order
/// tie-break, truncation to `limit`. Shared by both store variants so
/// their rankings are identical.
pub(crate) fn rank_embeddings(
    map: &Map,
    query: &[f32],
    limit: usize,
    similarity_threshold: f32,
) -> Vec<SearchHit> {
    let mut scored: Vec<(u64, SearchHit)> = map
        .iter()
        .filter_map(|(chunk_id, stored)| {
            let score = cosine_similarity(query, &stored.vector);
            if score >= similarity_threshold {
                Some((
                    stored.seq,
                    SearchHit {
                        chunk_id: chunk_id.clone(),
                        score,
                    },
                ))
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    scored.into_iter().take(limit).map(|(_, hit)| hit).collect()
}
