//! Async vector store

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::cache::AsyncTtlCache;
use super::config::StoreConfig;
use super::error::StoreError;
use super::snapshot::{EmbeddingMap, EmbeddingSnapshot, StoredEmbedding};
use super::{rank_embeddings, EmbeddingIndex};
use crate::core::types::{
    ChunkRecord, CorpusStats, FilePage, FileRecord, FileSummary, ScoredChunk, SearchHit,
    TextChunk,
};
use crate::core::utils::{file_extension, file_name};
use crate::db::{self, DatabaseConfig};

pub(crate) const CHUNK_COUNT_KEY: &str = "chunk_count";
pub(crate) const FILE_COUNT_KEY: &str = "file_count";
pub(crate) const STATS_KEY: &str = "statistics";

pub(crate) const CHUNK_COLUMNS: &str =
    "chunk_id, source_file, content, metadata, start_pos, end_pos, created_at";

pub(crate) const CHUNK_UPSERT: &str = "INSERT OR REPLACE INTO chunks \
     (chunk_id, source_file, content, metadata, start_pos, end_pos, created_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

pub(crate) const FILE_UPSERT: &str = "
INSERT INTO files (filepath, filename, file_size, chunk_count, last_modified, ingested_at)
VALUES (?1, ?2,
    (SELECT COALESCE(MAX(end_pos), 0) FROM chunks WHERE source_file = ?1),
    (SELECT COUNT(*) FROM chunks WHERE source_file = ?1),
    ?3, ?3)
ON CONFLICT(filepath) DO UPDATE SET
    filename = excluded.filename,
    file_size = excluded.file_size,
    chunk_count = excluded.chunk_count,
    last_modified = excluded.last_modified
";

/// Async vector store over a SQLite pool and an in-memory embedding map.
///
/// The store owns the metadata tables and the embedding snapshot.
/// Readers of the map proceed concurrently; writers are exclusive, so a
/// search always observes a consistent snapshot. Snapshot writes
/// serialize a clone of the map, keeping disk I/O off the lock.
pub struct VectorStore {
    pool: SqlitePool,
    config: StoreConfig,
    max_connections: usize,
    snapshot: EmbeddingSnapshot,
    index: RwLock<EmbeddingIndex>,
    count_cache: AsyncTtlCache<i64>,
    stats_cache: AsyncTtlCache<CorpusStats>,
}

impl VectorStore {
    /// Open the store: connect the pool, apply the schema, and load the
    /// embedding snapshot if one exists.
    pub async fn open(
        config: StoreConfig,
        db_config: &DatabaseConfig,
    ) -> Result<Self, StoreError> {
        let pool = db::create_database_pool(db_config).await?;
        db::migration::run_migrations(&pool).await?;

        let snapshot = EmbeddingSnapshot::new(config.snapshot_path.clone());
        let loader = snapshot.clone();
        let map = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| StoreError::Snapshot {
                reason: e.to_string(),
            })?;
        let next_seq = map.values().map(|s| s.seq + 1).max().unwrap_or(0);

        let ttl = std::time::Duration::from_secs(config.cache_ttl_secs);
        let capacity = config.cache_capacity;

        info!(
            "vector store opened with {} embeddings (dimension {})",
            map.len(),
            config.vector_size
        );

        Ok(Self {
            pool,
            max_connections: db_config.max_connections as usize,
            snapshot,
            index: RwLock::new(EmbeddingIndex { map, next_seq }),
            count_cache: AsyncTtlCache::new(capacity, ttl),
            stats_cache: AsyncTtlCache::new(capacity, ttl),
            config,
        })
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Connection pool counters, mirroring the blocking pool's stats.
    pub fn pool_stats(&self) -> super::PoolStats {
        let total = self.pool.size() as usize;
        let idle = self.pool.num_idle();
        super::PoolStats {
            pooled: idle,
            in_use: total.saturating_sub(idle),
            total_created: total,
            max_connections: self.max_connections,
        }
    }

    /// Upsert a batch of chunks with their embeddings.
    ///
    /// Validates counts and dimensions before touching any state. Chunk
    /// rows and file aggregates are written in one transaction, then the
    /// embedding map is updated and snapshotted. A snapshot failure is
    /// logged and leaves the in-memory map authoritative; durability
    /// catches up on the next successful write.
    pub async fn add_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        if chunks.len() != embeddings.len() {
            return Err(StoreError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        for embedding in embeddings {
            self.check_dimension(embedding)?;
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(CHUNK_UPSERT)
                .bind(&chunk.chunk_id)
                .bind(&chunk.source_file)
                .bind(&chunk.content)
                .bind(serde_json::Value::Object(chunk.metadata.clone()).to_string())
                .bind(chunk.start_pos as i64)
                .bind(chunk.end_pos as i64)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        let touched: std::collections::HashSet<&str> =
            chunks.iter().map(|c| c.source_file.as_str()).collect();
        for filepath in touched {
            sqlx::query(FILE_UPSERT)
                .bind(filepath)
                .bind(file_name(filepath))
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let map_copy = {
            let mut index = self.index.write().await;
            for (chunk, embedding) in chunks.iter().zip(embeddings) {
                match index.map.get_mut(&chunk.chunk_id) {
                    Some(stored) => stored.vector = embedding.clone(),
                    None => {
                        let seq = index.next_seq;
                        index.next_seq += 1;
                        index.map.insert(
                            chunk.chunk_id.clone(),
                            StoredEmbedding {
                                seq,
                                vector: embedding.clone(),
                            },
                        );
                    }
                }
            }
            index.map.clone()
        };

        self.persist_map(map_copy).await;
        self.invalidate_aggregates().await;

        info!("added {} chunks to vector store", chunks.len());
        Ok(())
    }

    /// Search for the most similar chunks.
    ///
    /// Brute-force cosine scan over every stored embedding. Results are
    /// filtered by `similarity_threshold`, sorted descending by score
    /// (ties in insertion order), and truncated to `limit`. An empty
    /// store yields an empty result, never an error.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let index = self.index.read().await;
        if index.map.is_empty() {
            debug!("search on empty store");
            return Ok(Vec::new());
        }
        self.check_dimension(query_embedding)?;

        let hits = rank_embeddings(&index.map, query_embedding, limit, similarity_threshold);
        debug!(
            "search found {} results above threshold {}",
            hits.len(),
            similarity_threshold
        );
        Ok(hits)
    }

    /// Search and join each hit with its chunk row, preserving rank order.
    pub async fn search_chunks(
        &self,
        query_embedding: &[f32],
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let hits = self
            .search(query_embedding, limit, similarity_threshold)
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; hits.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM chunks WHERE chunk_id IN ({})",
            CHUNK_COLUMNS, placeholders
        );
        let mut query = sqlx::query(&sql);
        for hit in &hits {
            query = query.bind(&hit.chunk_id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut by_id: HashMap<String, ChunkRecord> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let record = chunk_from_row(row)?;
            by_id.insert(record.chunk_id.clone(), record);
        }

        Ok(hits
            .iter()
            .filter_map(|hit| {
                by_id.remove(&hit.chunk_id).map(|record| ScoredChunk {
                    record,
                    score: hit.score,
                })
            })
            .collect())
    }

    /// Point lookup by chunk id. A miss is `None`, not an error.
    pub async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>, StoreError> {
        let sql = format!("SELECT {} FROM chunks WHERE chunk_id = ?1", CHUNK_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(chunk_from_row).transpose()
    }

    /// All chunks of one file, ordered by start position.
    pub async fn get_file_chunks(&self, filepath: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM chunks WHERE source_file = ?1 ORDER BY start_pos",
            CHUNK_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(filepath).fetch_all(&self.pool).await?;
        rows.iter().map(chunk_from_row).collect()
    }

    /// File-level bookkeeping row. A miss is `None`, not an error.
    pub async fn get_file(&self, filepath: &str) -> Result<Option<FileRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT filepath, filename, file_size, chunk_count, last_modified, ingested_at \
             FROM files WHERE filepath = ?1",
        )
        .bind(filepath)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(file_from_row).transpose()
    }

    /// Whether a file has already been ingested.
    pub async fn file_exists(&self, filepath: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM files WHERE filepath = ?1")
            .bind(filepath)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Total number of stored chunks. Cached briefly; invalidated on writes.
    pub async fn chunk_count(&self) -> Result<i64, StoreError> {
        if let Some(count) = self.count_cache.get(CHUNK_COUNT_KEY).await {
            return Ok(count);
        }
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        self.count_cache.set(CHUNK_COUNT_KEY, count).await;
        Ok(count)
    }

    /// Total number of ingested files. Cached briefly; invalidated on writes.
    pub async fn file_count(&self) -> Result<i64, StoreError> {
        if let Some(count) = self.count_cache.get(FILE_COUNT_KEY).await {
            return Ok(count);
        }
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        self.count_cache.set(FILE_COUNT_KEY, count).await;
        Ok(count)
    }

    /// Live embedding count from the in-memory map.
    pub async fn embedding_count(&self) -> usize {
        self.index.read().await.map.len()
    }

    /// Paginated file listing with per-file chunk counts.
    pub async fn list_files(&self, offset: i64, limit: i64) -> Result<FilePage, StoreError> {
        let total_files = self.file_count().await?;

        let rows = sqlx::query(
            "SELECT f.filepath, f.filename, f.file_size, f.last_modified, f.ingested_at, \
                    COUNT(c.chunk_id) AS chunks_count \
             FROM files f \
             LEFT JOIN chunks c ON f.filepath = c.source_file \
             GROUP BY f.filepath \
             ORDER BY f.ingested_at DESC \
             LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            let filename: String = row.try_get("filename")?;
            files.push(FileSummary {
                file_type: file_extension(&filename),
                filename,
                filepath: row.try_get("filepath")?,
                size: row.try_get("file_size")?,
                modified_date: row.try_get("last_modified")?,
                chunks_count: row.try_get("chunks_count")?,
            });
        }

        Ok(FilePage {
            files,
            total_files,
            offset,
            limit,
        })
    }

    /// Corpus statistics from relational aggregates, plus the live
    /// embedding count. The relational part is cached briefly.
    pub async fn statistics(&self) -> Result<CorpusStats, StoreError> {
        let vector_count = self.embedding_count().await;

        if let Some(mut stats) = self.stats_cache.get(STATS_KEY).await {
            stats.vector_count = vector_count;
            return Ok(stats);
        }

        let (total_chunks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let (total_files,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        let (total_size,): (Option<i64>,) =
            sqlx::query_as("SELECT SUM(file_size) FROM files")
                .fetch_one(&self.pool)
                .await?;
        let (last_updated,): (Option<String>,) =
            sqlx::query_as("SELECT MAX(ingested_at) FROM files")
                .fetch_one(&self.pool)
                .await?;

        let type_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT CASE \
                 WHEN INSTR(filename, '.') > 0 \
                 THEN LOWER(SUBSTR(filename, INSTR(filename, '.') + 1)) \
                 ELSE 'unknown' \
             END AS extension, COUNT(*) \
             FROM files GROUP BY extension",
        )
        .fetch_all(&self.pool)
        .await?;

        let total_size_mb =
            (total_size.unwrap_or(0) as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;

        let stats = CorpusStats {
            total_files,
            total_chunks,
            total_size_mb,
            file_types: type_rows.into_iter().collect(),
            last_updated,
            vector_count,
        };

        self.stats_cache.set(STATS_KEY, stats.clone()).await;
        Ok(stats)
    }

    /// Delete every chunk and file row, empty the embedding map, and
    /// persist the empty map. Irreversible.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM files").execute(&mut *tx).await?;
        tx.commit().await?;

        let map_copy = {
            let mut index = self.index.write().await;
            index.map.clear();
            index.next_seq = 0;
            index.map.clone()
        };
        self.persist_map(map_copy).await;
        self.invalidate_aggregates().await;

        info!("vector store cleared");
        Ok(())
    }

    /// Persist a final snapshot and close the pool.
    pub async fn close(&self) {
        let map_copy = self.index.read().await.map.clone();
        self.persist_map(map_copy).await;
        self.pool.close().await;
        info!("vector store closed");
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.config.vector_size {
            return Err(StoreError::DimensionMismatch {
                expected: self.config.vector_size,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    async fn persist_map(&self, map: EmbeddingMap) {
        let snapshot = self.snapshot.clone();
        match tokio::task::spawn_blocking(move || snapshot.persist(&map)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("embedding snapshot write failed: {}", e),
            Err(e) => error!("embedding snapshot task failed: {}", e),
        }
    }

    async fn invalidate_aggregates(&self) {
        self.count_cache.delete(CHUNK_COUNT_KEY).await;
        self.count_cache.delete(FILE_COUNT_KEY).await;
        self.stats_cache.delete(STATS_KEY).await;
    }
}

fn file_from_row(row: &SqliteRow) -> Result<FileRecord, StoreError> {
    let last_modified: Option<String> = row.try_get("last_modified")?;
    let ingested_raw: String = row.try_get("ingested_at")?;

    Ok(FileRecord {
        filepath: row.try_get("filepath")?,
        filename: row.try_get("filename")?,
        file_size: row.try_get("file_size")?,
        chunk_count: row.try_get("chunk_count")?,
        last_modified: last_modified
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        ingested_at: DateTime::parse_from_rfc3339(&ingested_raw)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Map a chunk row to its record type. Metadata is parsed leniently:
/// malformed JSON degrades to an empty map rather than failing the read.
fn chunk_from_row(row: &SqliteRow) -> Result<ChunkRecord, StoreError> {
    let metadata_json: Option<String> = row.try_get("metadata")?;
    let metadata = metadata_json
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    let created_raw: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(ChunkRecord {
        chunk_id: row.try_get("chunk_id")?,
        source_file: row.try_get("source_file")?,
        content: row.try_get("content")?,
        start_pos: row.try_get::<i64, _>("start_pos")? as usize,
        end_pos: row.try_get::<i64, _>("end_pos")? as usize,
        metadata,
        created_at,
    })
}
