//! Ollama API client
//!
//! Implements both model traits against a local Ollama endpoint:
//! `/api/chat` for generation, `/api/embeddings` for vectors, and
//! `/api/tags` as the availability probe. Connection-level failures are
//! reported as `Unavailable` so callers can degrade instead of retrying
//! blindly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ChatMessage, ChatModel, EmbeddingProvider, LlmError, Role};

/// Ollama endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    pub base_url: String,

    /// Model used for chat completions
    pub model: String,

    /// Model used for embeddings
    pub embedding_model: String,

    /// Output dimension of the embedding model
    pub embedding_dimension: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling cutoff
    pub top_p: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 768,
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2048,
            timeout_secs: 60,
        }
    }
}

impl OllamaConfig {
    /// Set the chat model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_connect() || e.is_timeout() {
        LlmError::Unavailable {
            reason: e.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            reason: e.to_string(),
        }
    }
}

/// Client for Ollama chat completions.
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    /// Build a client with the configured request timeout.
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Endpoint configuration
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// List the models the endpoint has available.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(LlmError::RequestFailed {
                reason: format!("tags endpoint returned {}", response.status()),
            });
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse {
                reason: e.to_string(),
            }
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Pull a model onto the endpoint if it is missing.
    pub async fn pull_model(&self, model_name: &str) -> Result<(), LlmError> {
        let url = format!("{}/api/pull", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "name": model_name, "stream": false }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(LlmError::RequestFailed {
                reason: format!("pull returned {}", response.status()),
            });
        }

        info!("pulled model: {}", model_name);
        Ok(())
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt {
            wire.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for message in messages {
            wire.push(WireMessage {
                role: wire_role(message.role),
                content: &message.content,
            });
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages: wire,
            stream: false,
            options: ChatOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("chat endpoint returned {}: {}", status, body);
            return Err(LlmError::RequestFailed {
                reason: format!("chat endpoint returned {}", status),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse {
                reason: e.to_string(),
            }
        })?;

        let content = parsed
            .message
            .map(|m| m.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: "response carried no message".to_string(),
            })?;

        debug!("completion of {} characters received", content.len());
        Ok(content)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Embedding provider backed by the Ollama embeddings endpoint.
pub struct OllamaEmbeddings {
    client: Client,
    config: OllamaConfig,
}

impl OllamaEmbeddings {
    /// Build an embedding client with the configured request timeout.
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let request = EmbeddingsRequest {
            model: &self.config.embedding_model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(LlmError::EmbeddingFailed {
                reason: format!("embeddings endpoint returned {}", response.status()),
            });
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse {
                reason: e.to_string(),
            }
        })?;

        if parsed.embedding.len() != self.config.embedding_dimension {
            return Err(LlmError::EmbeddingFailed {
                reason: format!(
                    "embedding dimension {} does not match configured {}",
                    parsed.embedding.len(),
                    self.config.embedding_dimension
                ),
            });
        }

        Ok(parsed.embedding)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }
}
