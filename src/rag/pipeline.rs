//! RAG query pipeline

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use super::RagConfig;
use crate::chunker::{ChunkerConfig, TextChunker};
use crate::core::error::EngineError;
use crate::core::utils::{char_len, truncate_chars};
use crate::llm::{ChatMessage, ChatModel, EmbeddingProvider};
use crate::store::VectorStore;

const FALLBACK_APOLOGY: &str =
    "I apologize, but I encountered an error processing your request. Please try again.";
const CHAT_APOLOGY: &str =
    "I apologize, but I'm having trouble processing your message right now.";

/// Per-query knobs; defaults come from [`RagConfig`]
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Maximum number of sources to retrieve
    pub max_sources: usize,

    /// Minimum similarity for a chunk to be used
    pub similarity_threshold: f32,

    /// Whether to retrieve context at all
    pub use_context: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        let config = RagConfig::default();
        Self {
            max_sources: config.max_sources,
            similarity_threshold: config.similarity_threshold,
            use_context: true,
        }
    }
}

impl QueryOptions {
    pub fn without_context(mut self) -> Self {
        self.use_context = false;
        self
    }

    pub fn with_max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

/// One cited source: preview text plus provenance and score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCitation {
    pub chunk_id: String,
    /// Preview of the chunk content, truncated for display
    pub content: String,
    pub source_file: String,
    pub similarity_score: f32,
}

/// Result of one RAG query. Transient; returned to the caller, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    /// Generated answer text
    pub response: String,

    /// Cited sources in descending similarity order
    pub sources: Vec<SourceCitation>,

    /// The raw context block handed to the model
    pub context_used: String,

    /// Wall-clock time for the whole operation
    pub response_time_ms: f64,

    /// Number of chunks retrieved
    pub retrieval_count: usize,
}

/// Component availability probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub llm_available: bool,
    pub store_ok: bool,
    pub embedder_ok: bool,
}

/// Corpus-level pipeline statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub corpus_chunks: i64,
    pub corpus_files: i64,
    pub embedding_dimension: usize,
}

/// Outcome of one ingestion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub source_file: String,
    pub chunks_added: usize,
    /// True when the file was already ingested and left untouched
    pub skipped: bool,
}

/// RAG pipeline: borrows the vector store and the two model black boxes,
/// owning none of their state.
pub struct RagPipeline {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn ChatModel>,
    chunker: TextChunker,
    pub(super) config: RagConfig,
}

impl RagPipeline {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn ChatModel>,
        chunker_config: ChunkerConfig,
        config: RagConfig,
    ) -> Self {
        info!("RAG pipeline initialized (model: {})", llm.model_name());
        Self {
            store,
            embedder,
            llm,
            chunker: TextChunker::new(chunker_config),
            config,
        }
    }

    /// The vector store this pipeline queries
    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Pipeline configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Answer a query, optionally grounded in retrieved context.
    ///
    /// Never fails: any retrieval or generation error is logged and
    /// converted into an explicit apology response with empty sources,
    /// rather than fabricated output or a crash.
    pub async fn query(
        &self,
        user_query: &str,
        chat_history: &[ChatMessage],
        options: &QueryOptions,
    ) -> RagResponse {
        let start = Instant::now();
        match self.query_inner(user_query, chat_history, options, start).await {
            Ok(response) => response,
            Err(e) => {
                error!("rag query failed: {}", e);
                RagResponse {
                    response: FALLBACK_APOLOGY.to_string(),
                    sources: Vec::new(),
                    context_used: String::new(),
                    response_time_ms: elapsed_ms(start),
                    retrieval_count: 0,
                }
            }
        }
    }

    async fn query_inner(
        &self,
        user_query: &str,
        chat_history: &[ChatMessage],
        options: &QueryOptions,
        start: Instant,
    ) -> Result<RagResponse, EngineError> {
        let mut sources = Vec::new();
        let mut context_parts: Vec<String> = Vec::new();

        if options.use_context && self.store.chunk_count().await? > 0 {
            info!(
                "retrieving context for query: '{}'",
                truncate_chars(user_query, 50)
            );

            let query_embedding = self.embedder.embed_one(user_query).await?;
            let scored = self
                .store
                .search_chunks(
                    &query_embedding,
                    options.max_sources,
                    options.similarity_threshold,
                )
                .await?;

            for hit in &scored {
                sources.push(SourceCitation {
                    chunk_id: hit.record.chunk_id.clone(),
                    content: truncate_chars(
                        &hit.record.content,
                        self.config.source_preview_chars,
                    ),
                    source_file: hit.record.source_file.clone(),
                    similarity_score: hit.score,
                });
                context_parts.push(format!(
                    "Source: {}\n{}",
                    hit.record.source_file, hit.record.content
                ));
            }

            info!("retrieved {} relevant sources", sources.len());
        }

        let mut context_text = context_parts.join("\n\n---\n\n");
        if char_len(&context_text) > self.config.max_context_chars {
            let cut: String = context_text
                .chars()
                .take(self.config.max_context_chars)
                .collect();
            context_text = format!("{}...\n[Context truncated]", cut);
        }

        let response = if options.use_context && !context_text.is_empty() {
            let prompt = self.build_rag_prompt(user_query, &context_text, chat_history);
            self.llm
                .complete(Some(&self.config.system_prompt), &[ChatMessage::user(prompt)])
                .await?
        } else {
            let mut messages: Vec<ChatMessage> = chat_history.to_vec();
            messages.push(ChatMessage::user(user_query));
            self.llm.complete(None, &messages).await?
        };

        let response_time_ms = elapsed_ms(start);
        info!(
            "rag query completed in {:.2}ms with {} sources",
            response_time_ms,
            sources.len()
        );

        Ok(RagResponse {
            response,
            retrieval_count: sources.len(),
            sources,
            context_used: context_text,
            response_time_ms,
        })
    }

    /// Grounded prompt: trailing history, delimited context block, the
    /// question, and the instruction to answer only from context.
    fn build_rag_prompt(
        &self,
        user_query: &str,
        context: &str,
        chat_history: &[ChatMessage],
    ) -> String {
        let mut parts: Vec<String> = Vec::new();

        if !chat_history.is_empty() {
            parts.push("Previous conversation:".to_string());
            for message in tail(chat_history, self.config.history_turns) {
                parts.push(format!("{}: {}", message.role, message.content));
            }
            parts.push(String::new());
        }

        parts.push("Based on the following context from the user's documents:".to_string());
        parts.push("---".to_string());
        parts.push(context.to_string());
        parts.push("---".to_string());
        parts.push(String::new());
        parts.push(format!("Question: {}", user_query));
        parts.push(String::new());
        parts.push(
            "Please provide a helpful and accurate answer based on the context above. \
             If the context doesn't contain enough information to fully answer the \
             question, please say so."
                .to_string(),
        );

        parts.join("\n")
    }

    /// Plain chat without retrieval.
    pub async fn simple_chat(&self, user_message: &str, chat_history: &[ChatMessage]) -> String {
        let mut messages: Vec<ChatMessage> =
            tail(chat_history, self.config.chat_history_turns).to_vec();
        messages.push(ChatMessage::user(user_message));

        match self
            .llm
            .complete(Some(&self.config.chat_system_prompt), &messages)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("simple chat failed: {}", e);
                CHAT_APOLOGY.to_string()
            }
        }
    }

    /// Chunk, embed, and store one document's text.
    ///
    /// Already-ingested files are skipped unless `force` is set.
    /// Embedding and insertion run in bounded batches so a large
    /// document cannot balloon peak memory.
    pub async fn ingest_text(
        &self,
        text: &str,
        source_file: &str,
        metadata: Map<String, Value>,
        force: bool,
    ) -> Result<IngestOutcome, EngineError> {
        if !force && self.store.file_exists(source_file).await? {
            info!("skipping already-ingested file: {}", source_file);
            return Ok(IngestOutcome {
                source_file: source_file.to_string(),
                chunks_added: 0,
                skipped: true,
            });
        }

        let chunks = self.chunker.chunk(text, source_file, metadata);
        if chunks.is_empty() {
            return Ok(IngestOutcome {
                source_file: source_file.to_string(),
                chunks_added: 0,
                skipped: false,
            });
        }

        let embed_batch = self.config.embedding_batch_size.max(1);
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(embed_batch) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            embeddings.extend(self.embedder.embed_many(&texts).await?);
        }

        let insert_batch = self.config.insert_batch_size.max(1);
        let mut start = 0;
        while start < chunks.len() {
            let end = (start + insert_batch).min(chunks.len());
            self.store
                .add_chunks(&chunks[start..end], &embeddings[start..end])
                .await?;
            start = end;
        }

        info!("ingested {} chunks from {}", chunks.len(), source_file);
        Ok(IngestOutcome {
            source_file: source_file.to_string(),
            chunks_added: chunks.len(),
            skipped: false,
        })
    }

    /// Probe the health of every collaborator.
    pub async fn health(&self) -> PipelineHealth {
        PipelineHealth {
            llm_available: self.llm.is_available().await,
            store_ok: self.store.chunk_count().await.is_ok(),
            embedder_ok: self.embedder.dimension() > 0,
        }
    }

    /// Corpus-level statistics for status endpoints.
    pub async fn pipeline_stats(&self) -> Result<PipelineStats, EngineError> {
        Ok(PipelineStats {
            corpus_chunks: self.store.chunk_count().await?,
            corpus_files: self.store.file_count().await?,
            embedding_dimension: self.embedder.dimension(),
        })
    }
}

fn tail(history: &[ChatMessage], turns: usize) -> &[ChatMessage] {
    &history[history.len().saturating_sub(turns)..]
}

pub(super) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
