//! Blocking SQLite connection pool
//!
//! A bounded pool of rusqlite connections for the blocking operating
//! mode. Acquisition hands out an RAII guard; dropping the guard returns
//! the connection to the pool, including on panic unwind. When the pool
//! is exhausted, callers block on a condvar until a connection is
//! released, unless the configuration opts into temporary over-limit
//! connections (closed on release, never pooled).
//!
//! Every physical connection gets the same PRAGMA tuning as the async
//! pool, so both operating modes behave identically at the engine level.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::error::StoreError;
use crate::db::{DatabaseConfig, SynchronousMode};

/// Pool usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Idle connections waiting in the pool
    pub pooled: usize,
    /// Connections currently handed out
    pub in_use: usize,
    /// Physical connections created over the pool lifetime and still open
    pub total_created: usize,
    /// Configured ceiling
    pub max_connections: usize,
}

struct PoolState {
    idle: Vec<Connection>,
    in_use: usize,
    total_created: usize,
    closed: bool,
}

/// Bounded blocking connection pool.
pub struct ConnectionPool {
    state: Mutex<PoolState>,
    available: Condvar,
    config: DatabaseConfig,
}

impl ConnectionPool {
    /// Create a pool for the configured database file.
    ///
    /// Connections are opened lazily; the database directory is created
    /// eagerly so the first open cannot fail on a missing path.
    pub fn new(config: DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                in_use: 0,
                total_created: 0,
                closed: false,
            }),
            available: Condvar::new(),
            config,
        })
    }

    fn create_connection(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.config.db_path)?;
        conn.busy_timeout(Duration::from_millis(u64::from(self.config.busy_timeout_ms)))?;

        let journal_mode = if self.config.enable_wal { "WAL" } else { "DELETE" };
        let synchronous = match self.config.synchronous {
            SynchronousMode::Off => "OFF",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Full => "FULL",
        };
        conn.execute_batch(&format!(
            "PRAGMA journal_mode={};\n\
             PRAGMA synchronous={};\n\
             PRAGMA cache_size={};\n\
             PRAGMA temp_store=MEMORY;\n\
             PRAGMA foreign_keys=ON;",
            journal_mode, synchronous, self.config.cache_size
        ))?;

        debug!("created new pooled connection to {:?}", self.config.db_path);
        Ok(conn)
    }

    /// Acquire a connection, blocking while the pool is exhausted.
    ///
    /// With `allow_overflow` set, exhaustion instead produces a temporary
    /// over-limit connection that is closed on release.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, StoreError> {
        let max = self.config.max_connections as usize;
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(StoreError::PoolClosed);
            }

            if let Some(conn) = state.idle.pop() {
                state.in_use += 1;
                return Ok(PooledConnection::pooled(self, conn));
            }

            if state.total_created < max {
                state.total_created += 1;
                state.in_use += 1;
                drop(state);
                return match self.create_connection() {
                    Ok(conn) => Ok(PooledConnection::pooled(self, conn)),
                    Err(e) => {
                        let mut state = self.state.lock();
                        state.total_created -= 1;
                        state.in_use -= 1;
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }

            if self.config.allow_overflow {
                drop(state);
                warn!("connection pool exhausted, creating temporary over-limit connection");
                let conn = self.create_connection()?;
                return Ok(PooledConnection::overflow(self, conn));
            }

            self.available.wait(&mut state);
        }
    }

    /// Pool usage counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            pooled: state.idle.len(),
            in_use: state.in_use,
            total_created: state.total_created,
            max_connections: self.config.max_connections as usize,
        }
    }

    /// Close the pool. Idempotent and safe during shutdown.
    ///
    /// Idle connections are closed immediately; connections currently in
    /// use are closed as their guards release them. Waiting acquirers are
    /// woken and observe [`StoreError::PoolClosed`].
    pub fn close_all(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;

        let closed = state.idle.len();
        state.total_created = state.total_created.saturating_sub(closed);
        state.idle.clear();
        self.available.notify_all();

        info!("connection pool closed ({} idle connections dropped)", closed);
    }

    fn release(&self, conn: Connection, pooled: bool) {
        let mut state = self.state.lock();
        if pooled {
            state.in_use = state.in_use.saturating_sub(1);
            if state.closed {
                state.total_created = state.total_created.saturating_sub(1);
                drop(conn);
            } else {
                state.idle.push(conn);
            }
        } else {
            // Over-limit connection: close instead of pooling.
            drop(conn);
        }
        self.available.notify_one();
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// RAII guard for a pooled connection.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
    pooled: bool,
}

impl<'a> PooledConnection<'a> {
    fn pooled(pool: &'a ConnectionPool, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
            pooled: true,
        }
    }

    fn overflow(pool: &'a ConnectionPool, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
            pooled: false,
        }
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.pooled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_pool(max: u32, overflow: bool) -> (Arc<ConnectionPool>, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = DatabaseConfig::with_path(temp.path().join("pool.db"))
            .with_max_connections(max)
            .with_overflow(overflow);
        (Arc::new(ConnectionPool::new(config).unwrap()), temp)
    }

    #[test]
    fn test_acquire_and_reuse() {
        let (pool, _temp) = test_pool(2, false);

        {
            let conn = pool.acquire().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
            assert_eq!(
                pool.stats(),
                PoolStats {
                    pooled: 0,
                    in_use: 1,
                    total_created: 1,
                    max_connections: 2
                }
            );
        }

        // Released connection is pooled, not closed
        let stats = pool.stats();
        assert_eq!(stats.pooled, 1);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.total_created, 1);

        // Re-acquiring reuses it rather than creating another
        let _conn = pool.acquire().unwrap();
        assert_eq!(pool.stats().total_created, 1);
    }

    #[test]
    fn test_exhaustion_blocks_until_release() {
        let (pool, _temp) = test_pool(1, false);

        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let conn = pool.acquire().unwrap();
                conn.execute_batch("CREATE TABLE IF NOT EXISTS t (x INTEGER)")
                    .unwrap();
            })
        };

        // Give the waiter time to block, then release
        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        drop(held);

        waiter.join().unwrap();
        assert_eq!(pool.stats().total_created, 1);
    }

    #[test]
    fn test_overflow_connection_is_not_pooled() {
        let (pool, _temp) = test_pool(1, true);

        let held = pool.acquire().unwrap();
        let extra = pool.acquire().unwrap();
        extra
            .execute_batch("CREATE TABLE IF NOT EXISTS t (x INTEGER)")
            .unwrap();

        drop(extra);
        drop(held);

        let stats = pool.stats();
        assert_eq!(stats.pooled, 1);
        assert_eq!(stats.total_created, 1);
    }

    #[test]
    fn test_close_all_is_idempotent() {
        let (pool, _temp) = test_pool(2, false);

        {
            let _conn = pool.acquire().unwrap();
        }
        pool.close_all();
        pool.close_all();

        assert!(matches!(pool.acquire(), Err(StoreError::PoolClosed)));
        assert_eq!(pool.stats().pooled, 0);
    }

    #[test]
    fn test_connections_are_uniformly_tuned() {
        let (pool, _temp) = test_pool(1, false);
        let conn = pool.acquire().unwrap();

        let journal: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
