//! CorpusRAG - local document retrieval and RAG engine
//!
//! This crate provides the core of a retrieval-augmented chat backend:
//! - Sentence-aware text chunking with character fallback
//! - A vector store persisting chunk metadata in SQLite and embeddings
//!   in an atomically-replaced snapshot blob
//! - Brute-force cosine similarity search with deterministic ranking
//! - Connection pooling and short-TTL caching for aggregate queries
//! - RAG orchestration over pluggable chat and embedding models, with
//!   streaming, cancellable responses
//!
//! Async is the primary operating mode; a blocking twin of the vector
//! store exists for thread-based callers.

pub mod chunker;
pub mod core;
pub mod db;
pub mod llm;
pub mod logging;
pub mod rag;
pub mod store;

// Re-export commonly used items
pub use crate::core::config::EngineConfig;
pub use crate::core::error::{EngineError, Result};
pub use crate::core::types::{ChunkRecord, CorpusStats, SearchHit, TextChunk};
pub use chunker::{ChunkerConfig, TextChunker};
pub use db::{create_database_pool, DatabaseConfig};
pub use llm::{ChatMessage, ChatModel, EmbeddingProvider, LlmError, OllamaClient, OllamaConfig};
pub use rag::{QueryOptions, RagConfig, RagPipeline, RagResponse, StreamEvent};
pub use store::{BlockingVectorStore, StoreConfig, StoreError, VectorStore};
