//! Schema migrations.
//!
//! Applied versions are tracked in `_migrations`; pending ones run in order,
//! each at most once.

use rusqlite::Connection;
use tracing::info;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_folders_table",
        sql: include_str!("sql/001_create_folders.sql"),
    },
    Migration {
        version: 2,
        description: "create_photos_table",
        sql: include_str!("sql/002_create_photos.sql"),
    },
    Migration {
        version: 3,
        description: "unique_live_rejects_folder",
        sql: include_str!("sql/003_unique_live_rejects.sql"),
    },
];

/// Runs all pending migrations on the given connection.
///
/// # Errors
///
/// Returns [`DatabaseError::Migration`] naming the first version that fails.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            "Running migration v{}: {}",
            migration.version, migration.description
        );
        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}
