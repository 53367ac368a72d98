//! Pool of SQLite connections.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so concurrent queries need
//! one connection each. Idle connections sit in a lock-free queue; when the
//! queue is empty a fresh connection is opened, and connections returned to a
//! full queue are closed.

use super::vector;
use crate::persistence::{Result, StoreError};
use crossbeam::queue::ArrayQueue;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a configured connection: WAL journal, busy timeout, vector functions.
pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    vector::register_functions(&conn)?;

    tracing::trace!(path = %path.display(), journal_mode = %mode, "SQLite connection opened");
    Ok(conn)
}

pub struct ConnectionPool {
    path: PathBuf,
    idle: ArrayQueue<Connection>,
}

impl ConnectionPool {
    /// Create a pool and open one connection eagerly so an unreachable
    /// database fails at start-up rather than on the first request.
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        let pool = Self {
            path: path.to_path_buf(),
            idle: ArrayQueue::new(size.max(1)),
        };
        let conn = connect(path)?;
        pool.idle
            .push(conn)
            .map_err(|_| StoreError::Pool("failed to seed connection pool".into()))?;
        Ok(pool)
    }

    /// Run `f` on an idle connection, opening a new one if none is idle.
    /// The connection goes back to the pool afterwards; if the pool is already
    /// full it is closed instead.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = match self.idle.pop() {
            Some(conn) => conn,
            None => connect(&self.path)?,
        };
        let result = f(&mut conn);
        let _ = self.idle.push(conn);
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_connections_are_reused() {
        let dir = tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("pool.db"), 2).unwrap();

        pool.with_connection(|conn| {
            conn.execute_batch("CREATE TABLE t (x INTEGER)")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(pool.idle.len(), 1);

        // Nested checkouts open extra connections; all see the same file.
        let count = pool
            .with_connection(|a| {
                a.execute("INSERT INTO t (x) VALUES (1)", [])?;
                pool.with_connection(|b| {
                    pool.with_connection(|_c| Ok(()))?;
                    Ok(b.query_row("SELECT COUNT(*) FROM t", [], |r| r.get::<_, i64>(0))?)
                })
            })
            .unwrap();
        assert_eq!(count, 1);

        // Capacity is two; the third connection was closed.
        assert_eq!(pool.idle.len(), 2);
    }

    #[test]
    fn test_connection_has_vector_functions() {
        let dir = tempdir().unwrap();
        let conn = connect(&dir.path().join("fn.db")).unwrap();
        let distance: f64 = conn
            .query_row(
                "SELECT cosine_distance(?1, ?1)",
                [vector::encode(&[0.6, 0.8])],
                |r| r.get(0),
            )
            .unwrap();
        assert!(distance.abs() < 1e-9);
    }
}
