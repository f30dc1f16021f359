//! Text chunking
//!
//! Splits raw document text into overlapping chunks with stable,
//! deterministic identifiers. Sentence-boundary packing is the primary
//! strategy; fixed-size character windows are the fallback when sentence
//! packing produces oversized chunks.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::core::types::TextChunk;
use crate::core::utils::char_len;

/// Chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Target chunk size, in characters
    pub chunk_size: usize,

    /// Characters of overlap carried from one chunk into the next
    pub chunk_overlap: usize,

    /// Minimum size for a chunk to be kept
    pub min_chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            min_chunk_size: 100,
        }
    }
}

impl ChunkerConfig {
    /// Set the target chunk size
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the overlap carried between chunks
    pub fn with_chunk_overlap(mut self, overlap: usize) -> Self {
        self.chunk_overlap = overlap;
        self
    }

    /// Set the minimum chunk size
    pub fn with_min_chunk_size(mut self, min: usize) -> Self {
        self.min_chunk_size = min;
        self
    }
}

/// Splits document text into embedding-ready chunks.
///
/// Chunking is deterministic: identical input text and configuration
/// always produce identical chunks and identifiers.
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    /// Create a chunker with the given configuration
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split text into chunks for the given source document.
    ///
    /// Returns an empty sequence when the trimmed text is shorter than the
    /// configured minimum. Caller-supplied metadata is carried into every
    /// chunk, alongside the chunk number and word count.
    pub fn chunk(
        &self,
        text: &str,
        source_file: &str,
        metadata: Map<String, Value>,
    ) -> Vec<TextChunk> {
        if char_len(text.trim()) < self.config.min_chunk_size {
            warn!(
                "text too short to chunk: {} characters from {}",
                char_len(text.trim()),
                source_file
            );
            return Vec::new();
        }

        let cleaned = clean_text(text);

        let mut chunks = self.chunk_by_sentences(&cleaned, source_file, &metadata);

        // A single sentence longer than the target is tolerated, but once a
        // chunk blows past 1.5x the target the sentence strategy has failed
        // and fixed windows take over.
        let oversize = self.config.chunk_size + self.config.chunk_size / 2;
        if chunks.iter().any(|c| char_len(&c.content) > oversize) {
            chunks = self.chunk_by_characters(&cleaned, source_file, &metadata);
        }

        info!("created {} chunks from {}", chunks.len(), source_file);
        chunks
    }

    /// Pack sentences greedily into chunks, carrying a character-level
    /// overlap tail from each closed chunk into the next.
    fn chunk_by_sentences(
        &self,
        text: &str,
        source_file: &str,
        metadata: &Map<String, Value>,
    ) -> Vec<TextChunk> {
        let sentences = split_sentences(text);

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_start = 0usize;
        let mut sequence = 0u32;

        for sentence in sentences {
            let would_exceed =
                char_len(&current) + char_len(sentence) > self.config.chunk_size;

            if would_exceed && !current.is_empty() {
                chunks.push(self.build_chunk(
                    current.trim(),
                    source_file,
                    metadata,
                    sequence,
                    current_start,
                    current_start + char_len(&current),
                ));

                // The next chunk starts with the trailing overlap of the
                // one just closed, prepended to the new sentence.
                let overlap_start =
                    char_len(&current).saturating_sub(self.config.chunk_overlap);
                let tail: String = current.chars().skip(overlap_start).collect();
                current = format!("{} {}", tail, sentence);
                current_start += overlap_start;
                sequence += 1;
            } else if current.is_empty() {
                current = sentence.to_string();
            } else {
                current.push(' ');
                current.push_str(sentence);
            }
        }

        let trimmed = current.trim();
        if !trimmed.is_empty() && char_len(trimmed) >= self.config.min_chunk_size {
            chunks.push(self.build_chunk(
                trimmed,
                source_file,
                metadata,
                sequence,
                current_start,
                current_start + char_len(&current),
            ));
        }

        chunks
    }

    /// Fallback: fixed-size character windows stepping by
    /// `chunk_size - chunk_overlap`, dropping windows below the minimum.
    fn chunk_by_characters(
        &self,
        text: &str,
        source_file: &str,
        metadata: &Map<String, Value>,
    ) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let step = self
            .config
            .chunk_size
            .saturating_sub(self.config.chunk_overlap)
            .max(1);

        let mut chunks = Vec::new();
        let mut sequence = 0u32;
        let mut start = 0usize;

        while start < chars.len() {
            let end = (start + self.config.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();

            if char_len(trimmed) >= self.config.min_chunk_size {
                chunks.push(self.build_chunk(
                    trimmed,
                    source_file,
                    metadata,
                    sequence,
                    start,
                    start + char_len(&window),
                ));
                sequence += 1;
            }

            start += step;
        }

        chunks
    }

    fn build_chunk(
        &self,
        content: &str,
        source_file: &str,
        metadata: &Map<String, Value>,
        sequence: u32,
        start_pos: usize,
        end_pos: usize,
    ) -> TextChunk {
        let mut chunk_metadata = metadata.clone();
        chunk_metadata.insert("chunk_number".into(), sequence.into());
        chunk_metadata.insert("total_length".into(), char_len(content).into());
        chunk_metadata.insert(
            "word_count".into(),
            content.split_whitespace().count().into(),
        );

        TextChunk {
            chunk_id: TextChunk::make_id(source_file, sequence),
            source_file: source_file.to_string(),
            content: content.to_string(),
            start_pos,
            end_pos,
            metadata: chunk_metadata,
        }
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

/// Normalize text for chunking: collapse every run of whitespace
/// (including blank lines) to a single space and trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text on sentence boundaries: `.`, `!`, or `?` followed by
/// whitespace. The separating whitespace belongs to neither sentence.
///
/// Also used by the streaming RAG path to segment responses.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let followed_by_space = chars
            .peek()
            .map_or(false, |&(_, next)| next.is_whitespace());
        if !followed_by_space {
            continue;
        }

        sentences.push(&text[start..idx + ch.len_utf8()]);

        while chars.peek().map_or(false, |&(_, c)| c.is_whitespace()) {
            chars.next();
        }
        start = chars.peek().map_or(text.len(), |&(i, _)| i);
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}
