//! Text chunk types
//!
//! Defines the unit of retrieval: a bounded span of source text prepared
//! for embedding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chunk produced by the chunker, not yet persisted.
///
/// Chunk identifiers are deterministic: `"{source_file}_{sequence:04}"`,
/// where the sequence restarts at zero for every chunking call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    /// Unique chunk identifier within a store
    pub chunk_id: String,

    /// Path-like identifier of the originating document
    pub source_file: String,

    /// Chunk text content
    pub content: String,

    /// Start offset into the cleaned source text (characters)
    pub start_pos: usize,

    /// End offset into the cleaned source text (characters)
    pub end_pos: usize,

    /// Open key-value metadata: chunk number, word count, caller tags
    pub metadata: Map<String, Value>,
}

impl TextChunk {
    /// Build the deterministic chunk identifier for a source/sequence pair.
    pub fn make_id(source_file: &str, sequence: u32) -> String {
        format!("{}_{:04}", source_file, sequence)
    }
}

/// A chunk row as persisted in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// Unique chunk identifier
    pub chunk_id: String,

    /// Path-like identifier of the originating document
    pub source_file: String,

    /// Chunk text content
    pub content: String,

    /// Start offset into the cleaned source text
    pub start_pos: usize,

    /// End offset into the cleaned source text
    pub end_pos: usize,

    /// Open key-value metadata
    pub metadata: Map<String, Value>,

    /// Row creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(TextChunk::make_id("notes.txt", 0), "notes.txt_0000");
        assert_eq!(TextChunk::make_id("notes.txt", 42), "notes.txt_0042");
        assert_eq!(TextChunk::make_id("a/b.pdf", 9999), "a/b.pdf_9999");
    }

    #[test]
    fn test_chunk_json_roundtrip() {
        let mut metadata = Map::new();
        metadata.insert("chunk_number".into(), 3.into());
        let chunk = TextChunk {
            chunk_id: TextChunk::make_id("doc.txt", 3),
            source_file: "doc.txt".into(),
            content: "Paris is the capital of France.".into(),
            start_pos: 120,
            end_pos: 151,
            metadata,
        };

        let json = serde_json::to_string(&chunk).expect("serialize");
        let back: TextChunk = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(chunk, back);
    }
}
