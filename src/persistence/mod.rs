//! Tool Index Store: durable tool rows with embeddings, queried by cosine
//! similarity inside SQLite.
//!
//! Synchronous API; every call checks a connection out of the pool. Async
//! callers wrap calls in `tokio::task::spawn_blocking`.

pub mod migrations;
mod pool;
pub mod vector;

pub use migrations::MigrationStatus;
pub use pool::connect;

use chrono::{DateTime, Utc};
use pool::ConnectionPool;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// SQLite VM steps between deadline checks.
const PROGRESS_STEPS: i32 = 1000;

const UPSERT_SQL: &str = r#"
    INSERT INTO tools (created_at, updated_at, name, description, embedding, input_schema)
    VALUES (?1, ?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(name) WHERE deleted_at IS NULL DO UPDATE SET
        description  = excluded.description,
        embedding    = excluded.embedding,
        input_schema = excluded.input_schema,
        updated_at   = excluded.updated_at
    RETURNING id, created_at, updated_at
"#;

const SIMILAR_SQL: &str = r#"
    SELECT id, name, description, input_schema, relevance_score
    FROM (
        SELECT id, name, description, input_schema,
               1.0 - cosine_distance(embedding, ?1) AS relevance_score
        FROM tools
        WHERE deleted_at IS NULL AND embedding IS NOT NULL AND length(embedding) = ?4
    )
    WHERE relevance_score IS NOT NULL AND relevance_score >= ?2
    ORDER BY relevance_score DESC, id ASC
    LIMIT ?3
"#;

const TOOL_COLUMNS: &str =
    "id, created_at, updated_at, deleted_at, name, description, embedding, input_schema";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("query deadline exceeded")]
    DeadlineExceeded,

    #[error("schema is at version {current}, expected {latest}; run `toolscout migrate up`")]
    SchemaOutdated { current: i64, latest: i64 },

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("blocking task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Input to an upsert.
#[derive(Debug, Clone)]
pub struct ToolRecord {
    pub name: String,
    pub description: String,
    pub embedding: Vec<f32>,
    pub input_schema: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistedTool {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub input_schema: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolWithScore {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub input_schema: Option<String>,
    pub relevance_score: f64,
}

struct StoreInner {
    pool: ConnectionPool,
    dimensions: usize,
}

/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ToolIndexStore {
    inner: Arc<StoreInner>,
}

impl ToolIndexStore {
    /// Open the store for vectors of length `dimensions`. Fails if the schema
    /// is not at the latest migration.
    pub fn open(path: &Path, pool_size: usize, dimensions: usize) -> Result<Self> {
        let pool = ConnectionPool::open(path, pool_size)?;
        pool.with_connection(|conn| migrations::ensure_current(conn))?;

        tracing::info!(
            path = %pool.path().display(),
            pool_size,
            dimensions,
            "Tool index store opened"
        );

        Ok(Self {
            inner: Arc::new(StoreInner { pool, dimensions }),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.inner.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.inner.dimensions,
                actual,
            });
        }
        Ok(())
    }

    /// Run `f` inside one transaction: committed if `f` returns `Ok`, rolled
    /// back otherwise.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.inner.pool.with_connection(|conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Insert a tool, or update the live row with the same name. `id` and
    /// `created_at` survive an update.
    pub fn upsert_tx(&self, tx: &Transaction<'_>, record: &ToolRecord) -> Result<UpsertOutcome> {
        self.check_dimensions(record.embedding.len())?;

        let outcome = tx.query_row(
            UPSERT_SQL,
            params![
                Utc::now(),
                record.name,
                record.description,
                vector::encode(&record.embedding),
                record.input_schema,
            ],
            |row| {
                Ok(UpsertOutcome {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )?;

        tracing::debug!(tool = %record.name, id = outcome.id, "Tool upserted");
        Ok(outcome)
    }

    /// Live tools whose `1 - cosine_distance` to `query` is at least
    /// `min_score`, best first, at most `limit`.
    ///
    /// `min_score` is clamped into `[-1, 1]`. Rows with a zero-norm embedding,
    /// or one whose length is not the index dimension, never match. When `deadline` is set the statement is
    /// interrupted once it passes.
    pub fn find_similar_with_score(
        &self,
        query: &[f32],
        min_score: f64,
        limit: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<ToolWithScore>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.check_dimensions(query.len())?;
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(StoreError::DeadlineExceeded);
        }

        let min_score = min_score.clamp(-1.0, 1.0);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let query = vector::encode(query);

        self.inner.pool.with_connection(|conn| {
            if let Some(deadline) = deadline {
                conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
            }

            let result = query_similar(conn, &query, min_score, limit, query.len() as i64);

            if deadline.is_some() {
                conn.progress_handler(PROGRESS_STEPS, None::<fn() -> bool>);
            }

            result.map_err(|e| {
                if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
                    StoreError::DeadlineExceeded
                } else {
                    StoreError::Sqlite(e)
                }
            })
        })
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<PersistedTool>> {
        self.inner.pool.with_connection(|conn| {
            let sql = format!(
                "SELECT {} FROM tools WHERE name = ?1 AND deleted_at IS NULL",
                TOOL_COLUMNS
            );
            Ok(conn.query_row(&sql, [name], tool_from_row).optional()?)
        })
    }

    /// Live tools ordered by name.
    pub fn list(&self) -> Result<Vec<PersistedTool>> {
        self.inner.pool.with_connection(|conn| {
            let sql = format!(
                "SELECT {} FROM tools WHERE deleted_at IS NULL ORDER BY name",
                TOOL_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let tools = stmt
                .query_map([], tool_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tools)
        })
    }

    pub fn count_live(&self) -> Result<usize> {
        self.inner.pool.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tools WHERE deleted_at IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Soft-delete the live row named `name`. Returns `false` if there was none.
    pub fn retire(&self, name: &str) -> Result<bool> {
        let retired = self.inner.pool.with_connection(|conn| {
            let changed = conn.execute(
                "UPDATE tools SET deleted_at = ?1, updated_at = ?1
                 WHERE name = ?2 AND deleted_at IS NULL",
                params![Utc::now(), name],
            )?;
            Ok(changed > 0)
        })?;

        if retired {
            tracing::info!(tool = %name, "Tool retired");
        }
        Ok(retired)
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.inner.pool.with_connection(|conn| {
            Ok(conn
                .query_row("SELECT value FROM index_meta WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?)
        })
    }

    pub fn set_meta_tx(&self, tx: &Transaction<'_>, key: &str, value: &str) -> Result<()> {
        tx.execute(
            "INSERT INTO index_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }
}

fn query_similar(
    conn: &Connection,
    query: &[u8],
    min_score: f64,
    limit: i64,
    blob_len: i64,
) -> rusqlite::Result<Vec<ToolWithScore>> {
    let mut stmt = conn.prepare_cached(SIMILAR_SQL)?;
    let rows = stmt.query_map(params![query, min_score, limit, blob_len], |row| {
        Ok(ToolWithScore {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            input_schema: row.get(3)?,
            relevance_score: row.get(4)?,
        })
    })?;
    let tools = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tools)
}

fn tool_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedTool> {
    let embedding = match row.get::<_, Option<Vec<u8>>>(6)? {
        Some(bytes) => Some(vector::decode(&bytes).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                Type::Blob,
                "embedding blob is not a whole number of f32 values".into(),
            )
        })?),
        None => None,
    };

    Ok(PersistedTool {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        deleted_at: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        embedding,
        input_schema: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn open_store(dir: &TempDir) -> ToolIndexStore {
        let path = dir.path().join("tools.db");
        let mut conn = connect(&path).unwrap();
        migrations::migrate_up(&mut conn).unwrap();
        ToolIndexStore::open(&path, 2, 3).unwrap()
    }

    fn record(name: &str, embedding: [f32; 3]) -> ToolRecord {
        ToolRecord {
            name: name.to_string(),
            description: format!("Tool: {}\nDescription: test tool", name),
            embedding: embedding.to_vec(),
            input_schema: None,
        }
    }

    fn insert(store: &ToolIndexStore, records: &[ToolRecord]) -> Vec<UpsertOutcome> {
        store
            .with_transaction(|tx| records.iter().map(|r| store.upsert_tx(tx, r)).collect())
            .unwrap()
    }

    fn names(results: &[ToolWithScore]) -> Vec<&str> {
        results.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_open_refuses_unmigrated_schema() {
        let dir = tempdir().unwrap();
        let err = ToolIndexStore::open(&dir.path().join("fresh.db"), 1, 3).err().unwrap();
        assert!(matches!(err, StoreError::SchemaOutdated { current: 0, latest: 2 }));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let first = insert(&store, &[record("get_holidays", [1.0, 0.0, 0.0])])[0];
        let mut changed = record("get_holidays", [0.0, 1.0, 0.0]);
        changed.description = "Tool: get_holidays\nDescription: updated".to_string();
        changed.input_schema = Some(r#"{"properties":{},"required":[]}"#.to_string());
        let second = insert(&store, &[changed])[0];

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.count_live().unwrap(), 1);

        let stored = store.find_by_name("get_holidays").unwrap().unwrap();
        assert_eq!(stored.description, "Tool: get_holidays\nDescription: updated");
        assert_eq!(stored.embedding, Some(vec![0.0, 1.0, 0.0]));
        assert!(stored.input_schema.is_some());
        assert!(stored.deleted_at.is_none());
    }

    #[test]
    fn test_scores_are_ordered_and_exact_match_ranks_first() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(
            &store,
            &[
                record("orthogonal", [0.0, 1.0, 0.0]),
                record("opposite", [-1.0, 0.0, 0.0]),
                record("exact", [2.0, 0.0, 0.0]),
                record("close", [1.0, 0.2, 0.0]),
            ],
        );

        let results = store
            .find_similar_with_score(&[1.0, 0.0, 0.0], -1.0, 10, None)
            .unwrap();

        assert_eq!(names(&results), vec!["exact", "close", "orthogonal", "opposite"]);
        assert!((results[0].relevance_score - 1.0).abs() < 1e-9);
        assert!((results[3].relevance_score + 1.0).abs() < 1e-9);
        for pair in results.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn test_threshold_and_limit() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(
            &store,
            &[
                record("a", [1.0, 0.0, 0.0]),
                record("b", [1.0, 1.0, 0.0]),
                record("c", [0.0, 1.0, 0.0]),
            ],
        );
        let query = [1.0, 0.0, 0.0];

        let above = store.find_similar_with_score(&query, 0.5, 10, None).unwrap();
        assert_eq!(names(&above), vec!["a", "b"]);
        assert!(above.iter().all(|t| t.relevance_score >= 0.5));

        let limited = store.find_similar_with_score(&query, -1.0, 2, None).unwrap();
        assert_eq!(names(&limited), vec!["a", "b"]);

        assert!(store.find_similar_with_score(&query, -1.0, 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_min_score_is_clamped() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(&store, &[record("a", [1.0, 0.0, 0.0]), record("b", [-1.0, 0.0, 0.0])]);

        let results = store
            .find_similar_with_score(&[1.0, 0.0, 0.0], -5.0, 10, None)
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_empty_catalog_returns_nothing() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let results = store
            .find_similar_with_score(&[0.3, 0.3, 0.3], -1.0, 5, None)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_ties_break_by_id() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(
            &store,
            &[record("second", [0.0, 0.0, 1.0]), record("first", [0.0, 0.0, 1.0])],
        );

        let results = store
            .find_similar_with_score(&[0.0, 0.0, 1.0], 0.0, 10, None)
            .unwrap();
        assert_eq!(names(&results), vec!["second", "first"]);
        assert!(results[0].id < results[1].id);
    }

    #[test]
    fn test_zero_vector_never_matches() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(&store, &[record("zero", [0.0, 0.0, 0.0]), record("unit", [0.0, 1.0, 0.0])]);

        let results = store
            .find_similar_with_score(&[0.0, 1.0, 0.0], -1.0, 10, None)
            .unwrap();
        assert_eq!(names(&results), vec!["unit"]);
    }

    #[test]
    fn test_exact_match_only_at_high_threshold() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(&store, &[record("a", [1.0, 0.0, 0.0]), record("b", [0.0, 1.0, 0.0])]);

        let results = store
            .find_similar_with_score(&[1.0, 0.0, 0.0], 0.99, 10, None)
            .unwrap();
        assert_eq!(names(&results), vec!["a"]);
        assert!((results[0].relevance_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rows_with_other_dimensions_are_skipped() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(&store, &[record("new_tool", [1.0, 0.0, 0.0])]);

        // Left behind by an earlier model with fewer dimensions.
        let conn = connect(&dir.path().join("tools.db")).unwrap();
        conn.execute(
            "INSERT INTO tools (created_at, updated_at, name, description, embedding)
             VALUES (?1, ?1, 'old_tool', 'Tool: old_tool', ?2)",
            params![Utc::now(), vector::encode(&[1.0, 0.0])],
        )
        .unwrap();
        assert_eq!(store.count_live().unwrap(), 2);

        let results = store
            .find_similar_with_score(&[1.0, 0.0, 0.0], 0.0, 5, None)
            .unwrap();
        assert_eq!(names(&results), vec!["new_tool"]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let err = store
            .find_similar_with_score(&[1.0, 0.0], 0.0, 5, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 3, actual: 2 }));

        let bad = ToolRecord {
            embedding: vec![1.0; 4],
            ..record("bad", [0.0; 3])
        };
        let err = store.with_transaction(|tx| store.upsert_tx(tx, &bad)).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { actual: 4, .. }));
    }

    #[test]
    fn test_retired_rows_are_invisible_and_name_is_reusable() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let original = insert(&store, &[record("get_holidays", [1.0, 0.0, 0.0])])[0];

        assert!(store.retire("get_holidays").unwrap());
        assert!(!store.retire("get_holidays").unwrap());
        assert!(store.find_by_name("get_holidays").unwrap().is_none());
        assert_eq!(store.count_live().unwrap(), 0);
        assert!(store
            .find_similar_with_score(&[1.0, 0.0, 0.0], -1.0, 5, None)
            .unwrap()
            .is_empty());

        let replacement = insert(&store, &[record("get_holidays", [1.0, 0.0, 0.0])])[0];
        assert_ne!(replacement.id, original.id);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let result: Result<()> = store.with_transaction(|tx| {
            store.upsert_tx(tx, &record("a", [1.0, 0.0, 0.0]))?;
            store.upsert_tx(tx, &record("b", [0.0, 1.0, 0.0]))?;
            Err(StoreError::Task("simulated failure".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.count_live().unwrap(), 0);
    }

    #[test]
    fn test_expired_deadline() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(&store, &[record("a", [1.0, 0.0, 0.0])]);

        let past = Instant::now() - Duration::from_millis(1);
        let err = store
            .find_similar_with_score(&[1.0, 0.0, 0.0], 0.0, 5, Some(past))
            .unwrap_err();
        assert!(matches!(err, StoreError::DeadlineExceeded));

        // A generous deadline leaves the query untouched, and the handler is
        // cleared afterwards.
        let future = Instant::now() + Duration::from_secs(30);
        assert_eq!(
            store
                .find_similar_with_score(&[1.0, 0.0, 0.0], 0.0, 5, Some(future))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store.find_similar_with_score(&[1.0, 0.0, 0.0], 0.0, 5, None).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_list_and_meta() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        insert(&store, &[record("zeta", [1.0, 0.0, 0.0]), record("alpha", [0.0, 1.0, 0.0])]);

        let listed: Vec<String> = store.list().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(listed, vec!["alpha", "zeta"]);

        assert!(store.get_meta("catalog_digest").unwrap().is_none());
        store
            .with_transaction(|tx| store.set_meta_tx(tx, "catalog_digest", "abc"))
            .unwrap();
        store
            .with_transaction(|tx| store.set_meta_tx(tx, "catalog_digest", "def"))
            .unwrap();
        assert_eq!(store.get_meta("catalog_digest").unwrap().as_deref(), Some("def"));
    }
}
