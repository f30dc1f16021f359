//! Error types for the retrieval engine
//!
//! Module-level error enums are aggregated here so callers can match on
//! the failure class: validation problems are rejected before any
//! mutation, lookup misses come back as `Option`, persistence failures
//! propagate, and upstream model outages stay distinguishable from
//! internal bugs.

use thiserror::Error;

use crate::llm::LlmError;
use crate::store::StoreError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Check if the error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_retryable(),
            EngineError::Llm(e) => e.is_retryable(),
            EngineError::Config(_) => false,
            EngineError::Io(_) => true,
            EngineError::Internal(_) => false,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    #[error("config parse failed: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid config value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("config save failed: {reason}")]
    SaveFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let err: EngineError = StoreError::CountMismatch {
            chunks: 2,
            embeddings: 3,
        }
        .into();
        assert!(!err.is_retryable());

        let err: EngineError = LlmError::Unavailable {
            reason: "connection refused".into(),
        }
        .into();
        assert!(err.is_retryable());

        let err = EngineError::Config(ConfigError::ParseFailed {
            reason: "bad json".into(),
        });
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_display_carries_context() {
        let err = EngineError::Store(StoreError::DimensionMismatch {
            expected: 384,
            actual: 768,
        });
        let msg = err.to_string();
        assert!(msg.contains("384"));
        assert!(msg.contains("768"));
    }
}
