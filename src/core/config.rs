//! Engine configuration
//!
//! Composes the per-module configuration sections into one serializable
//! document, with JSON file persistence using atomic temp-file-then-rename
//! writes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunker::ChunkerConfig;
use crate::core::error::ConfigError;
use crate::db::DatabaseConfig;
use crate::llm::ollama::OllamaConfig;
use crate::logging::LoggingConfig;
use crate::rag::RagConfig;
use crate::store::StoreConfig;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Relational database settings (shared by both operating modes)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Vector store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Text chunking settings
    #[serde(default)]
    pub chunker: ChunkerConfig,

    /// RAG orchestration settings
    #[serde(default)]
    pub rag: RagConfig,

    /// Ollama endpoint settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::ParseFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        serde_json::from_str(&raw).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })
    }

    /// Load configuration from a JSON file, falling back to defaults when
    /// the file is missing.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound { .. }) => Self::default(),
            Err(e) => {
                tracing::warn!("failed to load config from {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Persist configuration as JSON, atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
                reason: e.to_string(),
            })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed {
                reason: e.to_string(),
            })?;
        }

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).map_err(|e| ConfigError::SaveFailed {
            reason: e.to_string(),
        })?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            ConfigError::SaveFailed {
                reason: e.to_string(),
            }
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let config = EngineConfig::default();
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.chunker.chunk_size, config.chunker.chunk_size);
        assert_eq!(loaded.store.vector_size, config.store.vector_size);
        assert_eq!(loaded.ollama.base_url, config.ollama.base_url);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.json");

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::FileNotFound { .. })
        ));

        // load_or_default falls back silently
        let config = EngineConfig::load_or_default(&path);
        assert_eq!(config.chunker.chunk_size, ChunkerConfig::default().chunk_size);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::ParseFailed { .. })
        ));
    }
}
