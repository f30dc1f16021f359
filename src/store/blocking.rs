//! Blocking vector store
//!
//! Thread-based twin of [`super::VectorStore`] for synchronous callers,
//! built on the rusqlite connection pool. External guarantees match the
//! async variant: exclusive map writers, consistent-scan searches,
//! atomic snapshot persistence, and cached aggregates with explicit
//! invalidation on every mutation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rusqlite::params;
use tracing::{debug, error, info};

use super::cache::TtlCache;
use super::config::StoreConfig;
use super::error::StoreError;
use super::pool::{ConnectionPool, PoolStats};
use super::snapshot::{EmbeddingMap, EmbeddingSnapshot, StoredEmbedding};
use super::store::{
    CHUNK_COLUMNS, CHUNK_COUNT_KEY, CHUNK_UPSERT, FILE_COUNT_KEY, FILE_UPSERT, STATS_KEY,
};
use super::{rank_embeddings, EmbeddingIndex};
use crate::core::types::{
    ChunkRecord, CorpusStats, FilePage, FileRecord, FileSummary, ScoredChunk, SearchHit,
    TextChunk,
};
use crate::core::utils::{file_extension, file_name};
use crate::db::DatabaseConfig;

/// Blocking vector store over a pooled SQLite connection set.
pub struct BlockingVectorStore {
    pool: ConnectionPool,
    config: StoreConfig,
    snapshot: EmbeddingSnapshot,
    index: RwLock<EmbeddingIndex>,
    count_cache: TtlCache<i64>,
    stats_cache: TtlCache<CorpusStats>,
}

impl BlockingVectorStore {
    /// Open the store: build the pool, apply the schema, load the snapshot.
    pub fn open(config: StoreConfig, db_config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = ConnectionPool::new(db_config.clone())?;
        {
            let conn = pool.acquire()?;
            conn.execute_batch(crate::db::migration::SCHEMA)?;
        }

        let snapshot = EmbeddingSnapshot::new(config.snapshot_path.clone());
        let map = snapshot.load();
        let next_seq = map.values().map(|s| s.seq + 1).max().unwrap_or(0);

        let ttl = std::time::Duration::from_secs(config.cache_ttl_secs);
        let capacity = config.cache_capacity;

        info!(
            "blocking vector store opened with {} embeddings (dimension {})",
            map.len(),
            config.vector_size
        );

        Ok(Self {
            pool,
            snapshot,
            index: RwLock::new(EmbeddingIndex { map, next_seq }),
            count_cache: TtlCache::new(capacity, ttl),
            stats_cache: TtlCache::new(capacity, ttl),
            config,
        })
    }

    /// Store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Connection pool counters
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Upsert a batch of chunks with their embeddings.
    pub fn add_chunks(
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
        {
            let mut conn = self.pool.acquire()?;
            let tx = conn.transaction()?;

            for chunk in chunks {
                tx.execute(
                    CHUNK_UPSERT,
                    params![
                        chunk.chunk_id,
                        chunk.source_file,
                        chunk.content,
                        serde_json::Value::Object(chunk.metadata.clone()).to_string(),
                        chunk.start_pos as i64,
                        chunk.end_pos as i64,
                        now,
                    ],
                )?;
            }

            let touched: std::collections::HashSet<&str> =
                chunks.iter().map(|c| c.source_file.as_str()).collect();
            for filepath in touched {
                tx.execute(FILE_UPSERT, params![filepath, file_name(filepath), now])?;
            }

            tx.commit()?;
        }

        let map_copy = {
            let mut index = self.index.write();
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

        // Disk I/O stays off the map lock
        self.persist_map(&map_copy);
        self.invalidate_aggregates();

        info!("added {} chunks to vector store", chunks.len());
        Ok(())
    }

    /// Search for the most similar chunks. Same ranking as the async variant.
    pub fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let index = self.index.read();
        if index.map.is_empty() {
            debug!("search on empty store");
            return Ok(Vec::new());
        }
        self.check_dimension(query_embedding)?;

        Ok(rank_embeddings(
            &index.map,
            query_embedding,
            limit,
            similarity_threshold,
        ))
    }

    /// Search and join each hit with its chunk row, preserving rank order.
    pub fn search_chunks(
        &self,
        query_embedding: &[f32],
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let hits = self.search(query_embedding, limit, similarity_threshold)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<String, ChunkRecord> = HashMap::with_capacity(hits.len());
        {
            let conn = self.pool.acquire()?;
            let placeholders = vec!["?"; hits.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM chunks WHERE chunk_id IN ({})",
                CHUNK_COLUMNS, placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(ids), chunk_from_row)?;
            for record in rows {
                let record = record?;
                by_id.insert(record.chunk_id.clone(), record);
            }
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
    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>, StoreError> {
        let conn = self.pool.acquire()?;
        let sql = format!("SELECT {} FROM chunks WHERE chunk_id = ?1", CHUNK_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        match stmt.query_row(params![chunk_id], chunk_from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All chunks of one file, ordered by start position.
    pub fn get_file_chunks(&self, filepath: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT {} FROM chunks WHERE source_file = ?1 ORDER BY start_pos",
            CHUNK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![filepath], chunk_from_row)?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    /// File-level bookkeeping row. A miss is `None`, not an error.
    pub fn get_file(&self, filepath: &str) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(
            "SELECT filepath, filename, file_size, chunk_count, last_modified, ingested_at \
             FROM files WHERE filepath = ?1",
        )?;
        match stmt.query_row(params![filepath], file_from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a file has already been ingested.
    pub fn file_exists(&self, filepath: &str) -> Result<bool, StoreError> {
        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare("SELECT 1 FROM files WHERE filepath = ?1")?;
        Ok(stmt.exists(params![filepath])?)
    }

    /// Total number of stored chunks. Cached briefly; invalidated on writes.
    pub fn chunk_count(&self) -> Result<i64, StoreError> {
        if let Some(count) = self.count_cache.get(CHUNK_COUNT_KEY) {
            return Ok(count);
        }
        let conn = self.pool.acquire()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        self.count_cache.set(CHUNK_COUNT_KEY, count);
        Ok(count)
    }

    /// Total number of ingested files. Cached briefly; invalidated on writes.
    pub fn file_count(&self) -> Result<i64, StoreError> {
        if let Some(count) = self.count_cache.get(FILE_COUNT_KEY) {
            return Ok(count);
        }
        let conn = self.pool.acquire()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        self.count_cache.set(FILE_COUNT_KEY, count);
        Ok(count)
    }

    /// Live embedding count from the in-memory map.
    pub fn embedding_count(&self) -> usize {
        self.index.read().map.len()
    }

    /// Paginated file listing with per-file chunk counts.
    pub fn list_files(&self, offset: i64, limit: i64) -> Result<FilePage, StoreError> {
        let total_files = self.file_count()?;

        let conn = self.pool.acquire()?;
        let mut stmt = conn.prepare(
            "SELECT f.filepath, f.filename, f.file_size, f.last_modified, f.ingested_at, \
                    COUNT(c.chunk_id) AS chunks_count \
             FROM files f \
             LEFT JOIN chunks c ON f.filepath = c.source_file \
             GROUP BY f.filepath \
             ORDER BY f.ingested_at DESC \
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| {
            let filename: String = row.get("filename")?;
            Ok(FileSummary {
                file_type: file_extension(&filename),
                filename,
                filepath: row.get("filepath")?,
                size: row.get("file_size")?,
                modified_date: row.get("last_modified")?,
                chunks_count: row.get("chunks_count")?,
            })
        })?;

        let mut files = Vec::new();
        for file in rows {
            files.push(file?);
        }

        Ok(FilePage {
            files,
            total_files,
            offset,
            limit,
        })
    }

    /// Corpus statistics from relational aggregates, plus the live
    /// embedding count.
    pub fn statistics(&self) -> Result<CorpusStats, StoreError> {
        let vector_count = self.embedding_count();

        if let Some(mut stats) = self.stats_cache.get(STATS_KEY) {
            stats.vector_count = vector_count;
            return Ok(stats);
        }

        let conn = self.pool.acquire()?;
        let total_chunks: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let total_files: i64 =
            conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        let total_size: Option<i64> =
            conn.query_row("SELECT SUM(file_size) FROM files", [], |r| r.get(0))?;
        let last_updated: Option<String> =
            conn.query_row("SELECT MAX(ingested_at) FROM files", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT CASE \
                 WHEN INSTR(filename, '.') > 0 \
                 THEN LOWER(SUBSTR(filename, INSTR(filename, '.') + 1)) \
                 ELSE 'unknown' \
             END AS extension, COUNT(*) \
             FROM files GROUP BY extension",
        )?;
        let type_rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut file_types = HashMap::new();
        for entry in type_rows {
            let (extension, count) = entry?;
            file_types.insert(extension, count);
        }

        let total_size_mb =
            (total_size.unwrap_or(0) as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;

        let stats = CorpusStats {
            total_files,
            total_chunks,
            total_size_mb,
            file_types,
            last_updated,
            vector_count,
        };

        self.stats_cache.set(STATS_KEY, stats.clone());
        Ok(stats)
    }

    /// Delete every chunk and file row, empty the embedding map, and
    /// persist the empty map. Irreversible.
    pub fn clear(&self) -> Result<(), StoreError> {
        {
            let mut conn = self.pool.acquire()?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chunks", [])?;
            tx.execute("DELETE FROM files", [])?;
            tx.commit()?;
        }

        let map_copy = {
            let mut index = self.index.write();
            index.map.clear();
            index.next_seq = 0;
            index.map.clone()
        };
        self.persist_map(&map_copy);
        self.invalidate_aggregates();

        info!("vector store cleared");
        Ok(())
    }

    /// Persist a final snapshot and close the pool.
    pub fn close(&self) {
        let map_copy = self.index.read().map.clone();
        self.persist_map(&map_copy);
        self.pool.close_all();
        info!("blocking vector store closed");
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

    fn persist_map(&self, map: &EmbeddingMap) {
        if let Err(e) = self.snapshot.persist(map) {
            error!("embedding snapshot write failed: {}", e);
        }
    }

    fn invalidate_aggregates(&self) {
        self.count_cache.delete(CHUNK_COUNT_KEY);
        self.count_cache.delete(FILE_COUNT_KEY);
        self.stats_cache.delete(STATS_KEY);
    }
}

fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let last_modified: Option<String> = row.get("last_modified")?;
    let ingested_raw: String = row.get("ingested_at")?;

    Ok(FileRecord {
        filepath: row.get("filepath")?,
        filename: row.get("filename")?,
        file_size: row.get("file_size")?,
        chunk_count: row.get("chunk_count")?,
        last_modified: last_modified
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        ingested_at: DateTime::parse_from_rfc3339(&ingested_raw)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Map a chunk row to its record type, with the same lenient metadata
/// handling as the async variant.
fn chunk_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let metadata_json: Option<String> = row.get("metadata")?;
    let metadata = metadata_json
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    let created_raw: String = row.get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(ChunkRecord {
        chunk_id: row.get("chunk_id")?,
        source_file: row.get("source_file")?,
        content: row.get("content")?,
        start_pos: row.get::<_, i64>("start_pos")? as usize,
        end_pos: row.get::<_, i64>("end_pos")? as usize,
        metadata,
        created_at,
    })
}
