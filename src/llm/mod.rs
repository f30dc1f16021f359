//! Language model interfaces
//!
//! The engine treats text generation and embedding as black boxes behind
//! the [`ChatModel`] and [`EmbeddingProvider`] traits. The bundled
//! implementation talks to a local Ollama endpoint; tests substitute
//! in-process mocks.

pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ollama::{OllamaClient, OllamaConfig, OllamaEmbeddings};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "System"),
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Language model errors.
///
/// `Unavailable` is kept distinct from request failures so the RAG
/// orchestrator can degrade gracefully when the endpoint is down rather
/// than treating it as an internal bug.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model endpoint unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("unexpected response: {reason}")]
    InvalidResponse { reason: String },

    #[error("embedding request failed: {reason}")]
    EmbeddingFailed { reason: String },
}

impl LlmError {
    /// Check if the error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Unavailable { .. } | LlmError::RequestFailed { .. }
        )
    }
}

/// Text generation black box: `complete(system, messages) -> text`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a completion for the conversation, with an optional
    /// system instruction prepended.
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError>;

    /// Probe endpoint availability without issuing a completion.
    async fn is_available(&self) -> bool;

    /// Name of the backing model
    fn model_name(&self) -> &str;
}

/// Embedding black box: `embed(text) -> fixed-dimension vector`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Embed a batch of texts, one vector per input in order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    /// Output dimension of this provider's model
    fn dimension(&self) -> usize;
}
