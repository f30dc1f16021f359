//! Schema migration
//!
//! One table of chunks keyed by `chunk_id`, one table of files keyed by
//! `filepath`, and an index supporting per-file chunk lookups. The same
//! statements are applied by both operating modes.

use sqlx::SqlitePool;

/// Schema statements, idempotent by construction.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id    TEXT PRIMARY KEY,
    source_file TEXT NOT NULL,
    content     TEXT NOT NULL,
    metadata    TEXT,
    start_pos   INTEGER NOT NULL DEFAULT 0,
    end_pos     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    filepath      TEXT PRIMARY KEY,
    filename      TEXT NOT NULL,
    file_size     INTEGER NOT NULL DEFAULT 0,
    chunk_count   INTEGER NOT NULL DEFAULT 0,
    last_modified TEXT,
    ingested_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_source_file ON chunks(source_file);
";

/// Apply the schema to an async pool.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA.split(';') {
        let sql = statement.trim();
        if sql.is_empty() {
            continue;
        }
        sqlx::query(sql).execute(pool).await?;
    }
    tracing::debug!("database schema initialized");
    Ok(())
}
