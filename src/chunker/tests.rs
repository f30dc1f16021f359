//! Tests for the text chunker

use super::*;
use proptest::prelude::*;

fn small_chunker() -> TextChunker {
    TextChunker::new(
        ChunkerConfig::default()
            .with_chunk_size(100)
            .with_chunk_overlap(20)
            .with_min_chunk_size(10),
    )
}

#[test]
fn test_clean_text_collapses_whitespace() {
    assert_eq!(clean_text("Hello   world"), "Hello world");
    assert_eq!(clean_text("Hello\n\n\nworld\tfoo"), "Hello world foo");
    assert_eq!(clean_text("  padded  "), "padded");
    assert_eq!(clean_text(""), "");
}

#[test]
fn test_split_sentences_basic() {
    assert_eq!(
        split_sentences("Hello. World! Done? yes"),
        vec!["Hello.", "World!", "Done?", "yes"]
    );
    assert_eq!(split_sentences("No punctuation"), vec!["No punctuation"]);
    assert_eq!(
        split_sentences("Ends with period."),
        vec!["Ends with period."]
    );
    assert!(split_sentences("").is_empty());
}

#[test]
fn test_split_sentences_requires_trailing_space() {
    // Punctuation not followed by whitespace does not split
    assert_eq!(split_sentences("file.txt is here"), vec!["file.txt is here"]);
    assert_eq!(split_sentences("v1.2.3"), vec!["v1.2.3"]);
}

#[test]
fn test_rejects_short_text() {
    let chunker = TextChunker::default();
    let chunks = chunker.chunk("too short", "doc.txt", Map::new());
    assert!(chunks.is_empty());
}

#[test]
fn test_single_chunk_when_text_fits() {
    let chunker = small_chunker();
    let text = "First sentence here. Second sentence here. Third one.";
    let chunks = chunker.chunk(text, "doc.txt", Map::new());

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_id, "doc.txt_0000");
    assert_eq!(chunks[0].content, text);
    assert_eq!(chunks[0].start_pos, 0);
}

#[test]
fn test_sentence_packing_with_character_overlap() {
    let chunker = small_chunker();
    let s1 = format!("{}.", "x".repeat(79));
    let s2 = format!("{}.", "y".repeat(79));
    let text = format!("{} {}", s1, s2);

    let chunks = chunker.chunk(&text, "doc.txt", Map::new());
    assert_eq!(chunks.len(), 2);

    // First chunk holds the first sentence whole
    assert_eq!(chunks[0].content, s1);
    assert_eq!(chunks[0].start_pos, 0);
    assert_eq!(chunks[0].end_pos, 80);

    // Second chunk starts with the 20-character tail of the first
    let tail = format!("{}.", "x".repeat(19));
    assert_eq!(chunks[1].content, format!("{} {}", tail, s2));
    assert_eq!(chunks[1].start_pos, 60);
    assert_eq!(chunks[1].end_pos, 161);

    assert_eq!(chunks[0].chunk_id, "doc.txt_0000");
    assert_eq!(chunks[1].chunk_id, "doc.txt_0001");
}

#[test]
fn test_oversized_sentence_triggers_character_fallback() {
    let chunker = TextChunker::default(); // 500 / 50 / 100
    let text: String = "abcdefghij".repeat(200); // 2000 chars, no boundaries

    let chunks = chunker.chunk(&text, "blob.txt", Map::new());

    // Windows of 500 stepping by 450: starts at 0, 450, 900, 1350, 1800
    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[1].content, text[450..950]);
    assert_eq!(chunks[4].content, text[1800..2000]);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_id, format!("blob.txt_{:04}", i));
        assert!(chunk.content.chars().count() <= 500);
        assert_eq!(chunk.start_pos, i * 450);
    }
}

#[test]
fn test_metadata_is_carried_and_enriched() {
    let chunker = small_chunker();
    let mut metadata = Map::new();
    metadata.insert("project".into(), "alpha".into());

    let chunks = chunker.chunk(
        "A first sentence for the record. And one more to finish.",
        "doc.txt",
        metadata,
    );

    assert_eq!(chunks.len(), 1);
    let meta = &chunks[0].metadata;
    assert_eq!(meta.get("project").and_then(|v| v.as_str()), Some("alpha"));
    assert_eq!(meta.get("chunk_number").and_then(|v| v.as_u64()), Some(0));
    assert!(meta.get("word_count").and_then(|v| v.as_u64()).unwrap() > 0);
    assert!(meta.get("total_length").is_some());
}

proptest! {
    /// Chunking the same input twice yields identical output.
    #[test]
    fn prop_chunking_is_deterministic(text in "[a-zA-Z .!?]{0,800}") {
        let chunker = TextChunker::default();
        let a = chunker.chunk(&text, "doc.txt", Map::new());
        let b = chunker.chunk(&text, "doc.txt", Map::new());
        prop_assert_eq!(a, b);
    }

    /// Every chunk is a contiguous span of the cleaned text, identifiers
    /// are sequential, and offsets are well-formed.
    #[test]
    fn prop_chunks_cover_cleaned_text(text in "[a-zA-Z .!?]{0,800}") {
        let chunker = TextChunker::default();
        let cleaned = clean_text(&text);
        let chunks = chunker.chunk(&text, "doc.txt", Map::new());

        let mut prev_start = 0usize;
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert!(cleaned.contains(&chunk.content));
            prop_assert_eq!(&chunk.chunk_id, &format!("doc.txt_{:04}", i));
            prop_assert!(chunk.end_pos >= chunk.start_pos);
            prop_assert!(chunk.start_pos >= prev_start);
            prev_start = chunk.start_pos;
        }
    }
}
