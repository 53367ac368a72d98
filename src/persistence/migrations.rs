//! Versioned schema migrations tracked in `PRAGMA user_version`.

use super::{Result, StoreError};
use rusqlite::Connection;
use serde::Serialize;

struct Migration {
    version: i64,
    name: &'static str,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_tools",
        up: r#"
            CREATE TABLE tools (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL,
                deleted_at   TEXT,
                name         TEXT NOT NULL,
                description  TEXT NOT NULL,
                embedding    BLOB,
                input_schema TEXT
            );
            CREATE UNIQUE INDEX idx_tools_name_live ON tools(name) WHERE deleted_at IS NULL;
            CREATE INDEX idx_tools_deleted_at ON tools(deleted_at);
        "#,
        down: r#"
            DROP INDEX IF EXISTS idx_tools_deleted_at;
            DROP INDEX IF EXISTS idx_tools_name_live;
            DROP TABLE IF EXISTS tools;
        "#,
    },
    Migration {
        version: 2,
        name: "create_index_meta",
        up: r#"
            CREATE TABLE index_meta (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        down: "DROP TABLE IF EXISTS index_meta;",
    },
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i64,
    pub name: &'static str,
    pub applied: bool,
}

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

pub fn current_version(conn: &Connection) -> Result<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Fail unless the database is at exactly the latest schema version.
pub fn ensure_current(conn: &Connection) -> Result<()> {
    let current = current_version(conn)?;
    let latest = latest_version();
    if current != latest {
        return Err(StoreError::SchemaOutdated { current, latest });
    }
    Ok(())
}

/// Apply every pending migration, each in its own transaction. Returns the
/// versions applied.
pub fn migrate_up(conn: &mut Connection) -> Result<Vec<i64>> {
    let current = current_version(conn)?;
    if current > latest_version() {
        return Err(StoreError::Migration(format!(
            "database is at version {} but this build only knows up to {}",
            current,
            latest_version()
        )));
    }

    let mut applied = Vec::new();
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.up).map_err(|e| {
            StoreError::Migration(format!("{} ({}): {}", migration.version, migration.name, e))
        })?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;

        tracing::info!(version = migration.version, name = migration.name, "Migration applied");
        applied.push(migration.version);
    }
    Ok(applied)
}

/// Revert the most recent migration. Returns the reverted version, or `None`
/// on an empty schema.
pub fn migrate_down(conn: &mut Connection) -> Result<Option<i64>> {
    let current = current_version(conn)?;
    let Some(migration) = MIGRATIONS.iter().find(|m| m.version == current) else {
        if current == 0 {
            return Ok(None);
        }
        return Err(StoreError::Migration(format!(
            "no migration recorded for version {}",
            current
        )));
    };

    let previous = MIGRATIONS
        .iter()
        .map(|m| m.version)
        .filter(|&v| v < current)
        .max()
        .unwrap_or(0);

    let tx = conn.transaction()?;
    tx.execute_batch(migration.down).map_err(|e| {
        StoreError::Migration(format!("{} ({}): {}", migration.version, migration.name, e))
    })?;
    tx.pragma_update(None, "user_version", previous)?;
    tx.commit()?;

    tracing::info!(version = migration.version, name = migration.name, "Migration reverted");
    Ok(Some(migration.version))
}

pub fn status(conn: &Connection) -> Result<Vec<MigrationStatus>> {
    let current = current_version(conn)?;
    Ok(MIGRATIONS
        .iter()
        .map(|m| MigrationStatus {
            version: m.version,
            name: m.name,
            applied: m.version <= current,
        })
        .collect())
}
