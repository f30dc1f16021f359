//! Logging setup
//!
//! Structured logs via `tracing`, with an env-filtered level and
//! console, file, or combined output. File output goes through a
//! non-blocking daily-rolling appender; keep the returned guards alive
//! for the process lifetime or buffered lines are lost.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitializationError(String),

    #[error("failed to create log directory: {0}")]
    DirectoryCreationError(String),
}

/// Where log lines go
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `"info"` or `"corpus_rag=debug"`
    pub level: String,

    /// Output destination
    pub output: LogOutput,

    /// Directory for log files (file output only)
    pub directory: Option<PathBuf>,

    /// Log file name prefix
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Console,
            directory: None,
            file_prefix: "corpus-rag".to_string(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Returns the worker guards backing any non-blocking file writers.
pub fn init_logging(config: &LoggingConfig) -> Result<Vec<WorkerGuard>, LoggingError> {
    let env_filter = EnvFilter::try_new(&config.level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| LoggingError::InitializationError(e.to_string()))?;

    let mut guards = Vec::new();

    match config.output {
        LogOutput::Console => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()
                .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
        }
        LogOutput::File => {
            let (writer, guard) = file_writer(config)?;
            guards.push(guard);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .try_init()
                .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
        }
        LogOutput::Both => {
            let (writer, guard) = file_writer(config)?;
            guards.push(guard);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .try_init()
                .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
        }
    }

    Ok(guards)
}

fn file_writer(
    config: &LoggingConfig,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let directory = config
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("logs"));
    std::fs::create_dir_all(&directory)
        .map_err(|e| LoggingError::DirectoryCreationError(e.to_string()))?;

    let appender = rolling::daily(&directory, &config.file_prefix);
    Ok(tracing_appender::non_blocking(appender))
}
