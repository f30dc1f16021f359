//! Tests for the RAG pipeline, with in-process model mocks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Map;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::chunker::ChunkerConfig;
use crate::core::types::TextChunk;
use crate::db::DatabaseConfig;
use crate::llm::{ChatMessage, ChatModel, EmbeddingProvider, LlmError};
use crate::store::{StoreConfig, VectorStore};

struct MockChatModel {
    response: String,
    fail: bool,
    available: bool,
    calls: AtomicUsize,
    last_system: Mutex<Option<String>>,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockChatModel {
    fn answering(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            fail: false,
            available: true,
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            response: String::new(),
            fail: true,
            available: false,
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_system(&self) -> Option<String> {
        self.last_system.lock().unwrap().clone()
    }

    fn last_user_prompt(&self) -> Option<String> {
        self.last_messages
            .lock()
            .unwrap()
            .last()
            .map(|m| m.content.clone())
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().unwrap() = system_prompt.map(str::to_string);
        *self.last_messages.lock().unwrap() = messages.to_vec();

        if self.fail {
            return Err(LlmError::Unavailable {
                reason: "mock outage".to_string(),
            });
        }
        Ok(self.response.clone())
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

struct MockEmbedder {
    vector: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    fn fixed(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            vector: vec![0.0; dimension],
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::Unavailable {
                reason: "mock outage".to_string(),
            });
        }
        Ok(self.vector.clone())
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::Unavailable {
                reason: "mock outage".to_string(),
            });
        }
        Ok(vec![self.vector.clone(); texts.len()])
    }

    fn dimension(&self) -> usize {
        self.vector.len()
    }
}

async fn open_store() -> (Arc<VectorStore>, TempDir) {
    let temp = TempDir::new().unwrap();
    let db_config = DatabaseConfig::with_path(temp.path().join("corpus.db"));
    let config = StoreConfig::default()
        .with_vector_size(2)
        .with_snapshot_path(temp.path().join("vectors.bin"));
    let store = VectorStore::open(config, &db_config).await.unwrap();
    (Arc::new(store), temp)
}

fn build_pipeline(
    store: Arc<VectorStore>,
    embedder: Arc<MockEmbedder>,
    llm: Arc<MockChatModel>,
) -> Arc<RagPipeline> {
    let chunker_config = ChunkerConfig::default()
        .with_chunk_size(100)
        .with_chunk_overlap(20)
        .with_min_chunk_size(10);
    let config = RagConfig {
        stream_delay_ms: 1,
        ..RagConfig::default()
    };
    Arc::new(RagPipeline::new(store, embedder, llm, chunker_config, config))
}

async fn seed_paris(store: &VectorStore) {
    let chunk = TextChunk {
        chunk_id: "doc.txt_0000".to_string(),
        source_file: "doc.txt".to_string(),
        content: "Paris is the capital of France.".to_string(),
        start_pos: 0,
        end_pos: 31,
        metadata: Map::new(),
    };
    store.add_chunks(&[chunk], &[vec![1.0, 0.0]]).await.unwrap();
}

#[tokio::test]
async fn test_query_without_context_skips_retrieval_entirely() {
    let (store, _temp) = open_store().await;
    seed_paris(&store).await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::answering("A plain answer.");
    let pipeline = build_pipeline(store, Arc::clone(&embedder), Arc::clone(&llm));

    let options = QueryOptions::default().without_context();
    let reply = pipeline.query("What is the capital?", &[], &options).await;

    assert_eq!(embedder.call_count(), 0);
    assert_eq!(llm.call_count(), 1);
    assert_eq!(reply.response, "A plain answer.");
    assert!(reply.sources.is_empty());
    assert_eq!(reply.retrieval_count, 0);
    assert!(reply.context_used.is_empty());
}

#[tokio::test]
async fn test_query_with_context_builds_grounded_prompt() {
    let (store, _temp) = open_store().await;
    seed_paris(&store).await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::answering("Paris.");
    let pipeline = build_pipeline(store, Arc::clone(&embedder), Arc::clone(&llm));

    let history = vec![
        ChatMessage::user("Hello"),
        ChatMessage::assistant("Hi there"),
    ];
    let reply = pipeline
        .query("What is the capital of France?", &history, &QueryOptions::default())
        .await;

    assert_eq!(embedder.call_count(), 1);
    assert_eq!(reply.retrieval_count, 1);
    assert_eq!(reply.sources.len(), 1);
    assert_eq!(reply.sources[0].chunk_id, "doc.txt_0000");
    assert!((reply.sources[0].similarity_score - 1.0).abs() < 1e-6);
    assert!(reply.context_used.contains("Paris is the capital of France."));
    assert!(reply.response_time_ms >= 0.0);

    // The model saw the grounded prompt and the RAG system instruction
    let system = llm.last_system().expect("system prompt expected");
    assert!(system.contains("research assistant"));
    let prompt = llm.last_user_prompt().expect("prompt expected");
    assert!(prompt.contains("Source: doc.txt"));
    assert!(prompt.contains("Paris is the capital of France."));
    assert!(prompt.contains("Question: What is the capital of France?"));
    assert!(prompt.contains("Previous conversation:"));
    assert!(prompt.contains("User: Hello"));
}

#[tokio::test]
async fn test_query_empty_corpus_falls_back_to_plain_chat() {
    let (store, _temp) = open_store().await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::answering("Fallback answer.");
    let pipeline = build_pipeline(store, Arc::clone(&embedder), Arc::clone(&llm));

    let reply = pipeline
        .query("Anything?", &[ChatMessage::user("earlier turn")], &QueryOptions::default())
        .await;

    // Nothing to retrieve, so the embedding path is never touched
    assert_eq!(embedder.call_count(), 0);
    assert_eq!(reply.response, "Fallback answer.");
    assert!(reply.sources.is_empty());
    assert_eq!(llm.last_system(), None);
}

#[tokio::test]
async fn test_llm_failure_degrades_to_apology() {
    let (store, _temp) = open_store().await;
    seed_paris(&store).await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::failing();
    let pipeline = build_pipeline(store, embedder, llm);

    let reply = pipeline
        .query("What is the capital?", &[], &QueryOptions::default())
        .await;

    assert!(reply.response.contains("I apologize"));
    assert!(reply.sources.is_empty());
    assert_eq!(reply.retrieval_count, 0);
}

#[tokio::test]
async fn test_embedder_failure_degrades_to_apology() {
    let (store, _temp) = open_store().await;
    seed_paris(&store).await;

    let embedder = MockEmbedder::failing(2);
    let llm = MockChatModel::answering("unused");
    let pipeline = build_pipeline(store, embedder, Arc::clone(&llm));

    let reply = pipeline
        .query("What is the capital?", &[], &QueryOptions::default())
        .await;

    assert!(reply.response.contains("I apologize"));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_simple_chat_uses_chat_system_prompt() {
    let (store, _temp) = open_store().await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::answering("Chat reply.");
    let pipeline = build_pipeline(store, embedder, Arc::clone(&llm));

    let response = pipeline.simple_chat("Hello there", &[]).await;
    assert_eq!(response, "Chat reply.");

    let system = llm.last_system().expect("system prompt expected");
    assert!(system.contains("helpful AI assistant"));
    assert_eq!(llm.last_user_prompt().unwrap(), "Hello there");
}

#[tokio::test]
async fn test_ingest_text_chunks_embeds_and_stores() {
    let (store, _temp) = open_store().await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::answering("unused");
    let pipeline = build_pipeline(Arc::clone(&store), Arc::clone(&embedder), llm);

    let text = "The quick brown fox jumps over the lazy dog. \
                Pack my box with five dozen liquor jugs. \
                How vexingly quick daft zebras jump. \
                Sphinx of black quartz, judge my vow.";

    let outcome = pipeline
        .ingest_text(text, "pangrams.txt", Map::new(), false)
        .await
        .unwrap();

    assert!(!outcome.skipped);
    assert!(outcome.chunks_added > 0);
    assert_eq!(
        store.chunk_count().await.unwrap(),
        outcome.chunks_added as i64
    );
    assert!(store.file_exists("pangrams.txt").await.unwrap());
    assert!(embedder.call_count() > 0);

    // A second ingestion of the same source is skipped
    let again = pipeline
        .ingest_text(text, "pangrams.txt", Map::new(), false)
        .await
        .unwrap();
    assert!(again.skipped);
    assert_eq!(again.chunks_added, 0);

    // Unless forced, which re-chunks via upsert
    let forced = pipeline
        .ingest_text(text, "pangrams.txt", Map::new(), true)
        .await
        .unwrap();
    assert!(!forced.skipped);
    assert_eq!(
        store.chunk_count().await.unwrap(),
        outcome.chunks_added as i64
    );
}

#[tokio::test]
async fn test_health_reports_component_status() {
    let (store, _temp) = open_store().await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::failing();
    let pipeline = build_pipeline(store, embedder, llm);

    let health = pipeline.health().await;
    assert!(!health.llm_available);
    assert!(health.store_ok);
    assert!(health.embedder_ok);

    let stats = pipeline.pipeline_stats().await.unwrap();
    assert_eq!(stats.corpus_chunks, 0);
    assert_eq!(stats.embedding_dimension, 2);
}

#[tokio::test]
async fn test_stream_query_emits_segments_then_complete() {
    let (store, _temp) = open_store().await;
    seed_paris(&store).await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::answering("First sentence. Second sentence. Third sentence.");
    let pipeline = build_pipeline(store, embedder, llm);

    let mut rx = pipeline.stream_query(
        "What is the capital?".to_string(),
        Vec::new(),
        QueryOptions::default(),
        CancellationToken::new(),
    );

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(StreamEvent::Status { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::Sources { sources } if sources.len() == 1)));

    let segments: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0].trim(), "First sentence.");

    match events.last() {
        Some(StreamEvent::Complete {
            source_count,
            total_length,
            ..
        }) => {
            assert_eq!(*source_count, 1);
            assert_eq!(
                *total_length,
                "First sentence. Second sentence. Third sentence.".len()
            );
        }
        other => panic!("expected Complete as final event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_query_cancellation_stops_emission() {
    let (store, _temp) = open_store().await;

    let embedder = MockEmbedder::fixed(vec![1.0, 0.0]);
    let llm = MockChatModel::answering("First sentence. Second sentence. Third sentence.");
    let pipeline = {
        let chunker_config = ChunkerConfig::default().with_min_chunk_size(10);
        let config = RagConfig {
            stream_delay_ms: 200,
            ..RagConfig::default()
        };
        Arc::new(RagPipeline::new(store, embedder, llm, chunker_config, config))
    };

    let cancel = CancellationToken::new();
    let mut rx = pipeline.stream_query(
        "Anything?".to_string(),
        Vec::new(),
        QueryOptions::default().without_context(),
        cancel.clone(),
    );

    let mut chunk_events = 0usize;
    let mut saw_complete = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Chunk { .. } => {
                chunk_events += 1;
                // Cancel while the emitter sleeps between segments
                cancel.cancel();
            }
            StreamEvent::Complete { .. } => saw_complete = true,
            _ => {}
        }
    }

    assert_eq!(chunk_events, 1);
    assert!(!saw_complete, "no completion event may follow cancellation");
}
