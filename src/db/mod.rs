//! Database module
//!
//! SQLite connectivity for the async operating mode, with WAL support for
//! concurrent readers. Every pooled connection is tuned identically at
//! connect time. The blocking operating mode shares this configuration
//! through [`crate::store::ConnectionPool`].

pub mod migration;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;

/// SQLite synchronous mode configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SynchronousMode {
    /// Fastest, but may lose data on crash
    Off,
    /// Balanced performance and safety
    #[default]
    Normal,
    /// Safest, but slowest
    Full,
}

/// SQLite connection configuration, shared by both operating modes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path
    pub db_path: PathBuf,

    /// Maximum number of connections
    pub max_connections: u32,

    /// Minimum number of connections kept open (async mode)
    pub min_connections: u32,

    /// Connection acquire timeout in seconds (async mode)
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds (async mode)
    pub idle_timeout_secs: u64,

    /// Whether to enable WAL mode
    pub enable_wal: bool,

    /// Synchronous mode
    pub synchronous: SynchronousMode,

    /// Page cache size (pages, negative means KB)
    pub cache_size: i32,

    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u32,

    /// Blocking mode only: on pool exhaustion, create a temporary
    /// over-limit connection instead of waiting. Such connections are
    /// closed on release, never pooled.
    pub allow_overflow: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: directories::ProjectDirs::from("com", "corpusrag", "CorpusRAG")
                .map(|dirs| dirs.data_local_dir().join("corpus.db"))
                .unwrap_or_else(|| PathBuf::from("data/corpus.db")),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            enable_wal: true,
            synchronous: SynchronousMode::Normal,
            cache_size: -64000, // 64MB cache
            busy_timeout_ms: 5000,
            allow_overflow: false,
        }
    }
}

impl DatabaseConfig {
    /// Create a config pointing at the given database file
    pub fn with_path(db_path: PathBuf) -> Self {
        Self {
            db_path,
            ..Default::default()
        }
    }

    /// Set WAL mode
    pub fn with_wal(mut self, enable: bool) -> Self {
        self.enable_wal = enable;
        self
    }

    /// Set maximum connections
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set synchronous mode
    pub fn with_synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }

    /// Allow temporary over-limit connections in blocking mode
    pub fn with_overflow(mut self, allow: bool) -> Self {
        self.allow_overflow = allow;
        self
    }

    /// Connection options with the full per-connection PRAGMA set applied
    pub(crate) fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true)
            .journal_mode(if self.enable_wal {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            })
            .synchronous(match self.synchronous {
                SynchronousMode::Off => SqliteSynchronous::Off,
                SynchronousMode::Normal => SqliteSynchronous::Normal,
                SynchronousMode::Full => SqliteSynchronous::Full,
            })
            .busy_timeout(Duration::from_millis(u64::from(self.busy_timeout_ms)))
            .foreign_keys(true)
            .pragma("cache_size", self.cache_size.to_string())
            .pragma("temp_store", "MEMORY")
    }
}

/// Create an async SQLite connection pool with the given configuration.
///
/// PRAGMAs are part of the connect options, so every physical connection
/// the pool opens is tuned the same way.
pub async fn create_database_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("failed to create database directory: {}", e),
            ))
        })?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(config.connect_options())
        .await?;

    tracing::info!(
        "database pool created: {:?} (WAL: {}, connections: {})",
        config.db_path,
        config.enable_wal,
        config.max_connections
    );

    Ok(pool)
}
