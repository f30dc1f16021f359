//! RAG orchestration
//!
//! Combines retrieval over the vector store with a language model call:
//! embed the query, rank chunks, build a grounded prompt, generate, and
//! package the response with cited sources. A streaming variant emits
//! the response sentence by sentence with prompt cancellation.

mod pipeline;
mod stream;

#[cfg(test)]
mod tests;

pub use pipeline::{
    IngestOutcome, PipelineHealth, PipelineStats, QueryOptions, RagPipeline, RagResponse,
    SourceCitation,
};
pub use stream::StreamEvent;

use serde::{Deserialize, Serialize};

/// Default system instruction for grounded answers
const RAG_SYSTEM_PROMPT: &str = "You are a helpful research assistant. You have access to a \
user's document corpus and can answer questions based on the provided context.\n\n\
When answering:\n\
1. Use the provided context to answer questions accurately\n\
2. If the context doesn't contain relevant information, say so clearly\n\
3. Cite sources when possible\n\
4. Be concise but thorough\n\
5. If asked about something not in the context, acknowledge the limitation\n\n\
Always be helpful, honest, and precise in your responses.";

/// Default system instruction for plain chat
const CHAT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Be concise, helpful, and friendly.";

/// RAG orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Default number of sources to retrieve
    pub max_sources: usize,

    /// Default minimum similarity for retrieval
    pub similarity_threshold: f32,

    /// Character budget for the combined context block
    pub max_context_chars: usize,

    /// Preview length for source citations, in characters
    pub source_preview_chars: usize,

    /// Trailing conversation turns included in the grounded prompt
    pub history_turns: usize,

    /// Trailing conversation turns included in plain chat
    pub chat_history_turns: usize,

    /// Delay between streamed response segments, in milliseconds
    pub stream_delay_ms: u64,

    /// Texts embedded per provider call during ingestion
    pub embedding_batch_size: usize,

    /// Chunks written per store call during ingestion
    pub insert_batch_size: usize,

    /// System instruction for grounded answers
    pub system_prompt: String,

    /// System instruction for plain chat
    pub chat_system_prompt: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_sources: 5,
            similarity_threshold: 0.5,
            max_context_chars: 4000,
            source_preview_chars: 200,
            history_turns: 3,
            chat_history_turns: 5,
            stream_delay_ms: 30,
            embedding_batch_size: 32,
            insert_batch_size: 64,
            system_prompt: RAG_SYSTEM_PROMPT.to_string(),
            chat_system_prompt: CHAT_SYSTEM_PROMPT.to_string(),
        }
    }
}
