//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies pending
//! ones in order. `heal` re-applies the whole set unconditionally, which is
//! what the schema-drift recovery path uses when a live database turns out
//! to be missing an expected column.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly. Statements must be idempotent
    /// (`CREATE TABLE IF NOT EXISTS` etc.) so `heal` can re-run them.
    Standard,
    /// ALTER TABLE ADD COLUMN — skip if column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// All migrations in order. Each is applied at most once by `run_all`.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_sessions_table",
        sql: include_str!("sql/001_create_sessions.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_slides_table",
        sql: include_str!("sql/002_create_slides.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_export_jobs_table",
        sql: include_str!("sql/003_create_export_jobs.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "add_language_to_sessions",
        sql: include_str!("sql/004_add_language.sql"),
        kind: MigrationKind::AddColumn {
            table: "sessions",
            column: "language",
        },
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    ensure_tracking_table(conn)?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        apply(conn, migration)?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Re-applies every migration regardless of the recorded version, then
/// backfills any missing `_migrations` rows. Used to recover a database
/// whose live schema has drifted from what the version table claims.
pub fn heal(conn: &Connection) -> Result<(), DatabaseError> {
    ensure_tracking_table(conn)?;

    for migration in MIGRATIONS {
        apply(conn, migration)?;
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

fn ensure_tracking_table(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let should_run = match &migration.kind {
        MigrationKind::Standard => true,
        MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
    };

    if should_run {
        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
    }

    Ok(())
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // Validate identifier — only alphanumeric and underscores allowed.
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}
